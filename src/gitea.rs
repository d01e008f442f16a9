//! Gitea API client for the destination side
//!
//! [`DestinationApi`] is the seam the orchestrator drives; [`GiteaClient`]
//! implements it over the Gitea REST API (`/api/v1`). Every endpoint has an
//! explicit request struct instead of an ad-hoc JSON map.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Visibility;

/// Per-request network timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to the Gitea API.
#[derive(Debug, Error)]
pub enum GiteaError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API answered with an unexpected status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GiteaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GiteaError::Status { status: 404, .. })
    }
}

/// Kind of destination container owning a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    User,
    Organization,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::User => f.write_str("user"),
            TargetKind::Organization => f.write_str("organization"),
        }
    }
}

/// Destination container reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Destination-assigned identifier
    pub id: i64,
    pub name: String,
    pub kind: TargetKind,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// `GET /user` and `GET /orgs/{name}` share this shape
#[derive(Debug, Clone, Deserialize)]
struct Account {
    id: i64,
    username: String,
}

/// `POST /orgs`
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrganizationRequest {
    pub username: String,
    pub visibility: Visibility,
}

/// `POST /repos/migrate`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrateRepoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub clone_addr: String,
    pub mirror: bool,
    pub repo_name: String,
    pub uid: i64,
    pub private: bool,
}

/// `POST /repos/{owner}/{repo}/issues`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateIssueRequest {
    pub title: String,
    pub body: String,
    pub closed: bool,
}

/// `POST /repos/{owner}/{repo}/labels`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateLabelRequest {
    pub name: String,
    pub color: String,
}

/// `POST /repos/{owner}/{repo}/issues/{index}/labels`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IssueLabelsRequest {
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IssueResponse {
    number: u64,
}

/// Operations consumed from the destination hosting service
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// The authenticated destination user as a target
    async fn current_user(&self) -> Result<Target, GiteaError>;

    /// Look up an organization by name
    async fn get_organization(&self, name: &str) -> Result<Target, GiteaError>;

    /// Create an organization; an existing one is not an error
    async fn create_organization(&self, request: &CreateOrganizationRequest) -> Result<(), GiteaError>;

    /// Whether `target/name` already exists
    async fn repository_exists(&self, target: &Target, name: &str) -> Result<bool, GiteaError>;

    /// Create a pull mirror
    async fn migrate_repository(&self, request: &MigrateRepoRequest) -> Result<(), GiteaError>;

    /// Whether the authenticated user has starred `target/name`
    async fn is_starred(&self, target: &Target, name: &str) -> Result<bool, GiteaError>;

    /// Star `target/name`; starring twice is a no-op
    async fn star_repository(&self, target: &Target, name: &str) -> Result<(), GiteaError>;

    /// Create an issue and return its number
    async fn create_issue(
        &self,
        target: &Target,
        repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<u64, GiteaError>;

    async fn create_label(
        &self,
        target: &Target,
        repo: &str,
        request: &CreateLabelRequest,
    ) -> Result<(), GiteaError>;

    async fn add_issue_labels(
        &self,
        target: &Target,
        repo: &str,
        issue: u64,
        request: &IssueLabelsRequest,
    ) -> Result<(), GiteaError>;
}

/// Gitea REST client
#[derive(Clone)]
pub struct GiteaClient {
    http: reqwest::Client,
    base_url: String,
}

impl GiteaClient {
    /// Create a client for `base_url` authenticating with `token`
    pub fn new(base_url: &str, token: &str) -> Result<Self, GiteaError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("token {}", token))
            .map_err(|e| GiteaError::Config(format!("invalid token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("gitea-mirror"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Send a request and return the raw status and body
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(StatusCode, String), GiteaError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!("{} {} -> {}", method, path, status);
        Ok((status, text))
    }

    /// Send a request and fail unless the status is one of `expected`
    async fn send_expecting<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        expected: &[StatusCode],
    ) -> Result<String, GiteaError> {
        let (status, text) = self.send(method, path, body).await?;
        if expected.contains(&status) {
            Ok(text)
        } else {
            Err(GiteaError::Status {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GiteaError> {
        let text = self
            .send_expecting::<()>(Method::GET, path, None, &[StatusCode::OK])
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Probe a path answering 2xx for "yes" and 404 for "no"
    async fn status_matches(&self, path: &str, yes: StatusCode) -> Result<bool, GiteaError> {
        let (status, text) = self.send::<()>(Method::GET, path, None).await?;
        match status {
            s if s == yes => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(GiteaError::Status {
                status: other.as_u16(),
                message: text,
            }),
        }
    }
}

#[async_trait]
impl DestinationApi for GiteaClient {
    async fn current_user(&self) -> Result<Target, GiteaError> {
        let user: Account = self.get_json("/user").await?;
        Ok(Target {
            id: user.id,
            name: user.username,
            kind: TargetKind::User,
        })
    }

    async fn get_organization(&self, name: &str) -> Result<Target, GiteaError> {
        let org: Account = self.get_json(&format!("/orgs/{}", name)).await?;
        debug!("Resolved organization {} (login {})", name, org.username);
        Ok(Target {
            id: org.id,
            name: name.to_string(),
            kind: TargetKind::Organization,
        })
    }

    async fn create_organization(&self, request: &CreateOrganizationRequest) -> Result<(), GiteaError> {
        if self
            .status_matches(&format!("/orgs/{}", request.username), StatusCode::OK)
            .await?
        {
            info!("Organization {} already exists", request.username);
            return Ok(());
        }

        // 422 means another caller created it between the lookup and the POST
        self.send_expecting(
            Method::POST,
            "/orgs",
            Some(request),
            &[StatusCode::CREATED, StatusCode::UNPROCESSABLE_ENTITY],
        )
        .await?;

        info!("Created organization: {}", request.username);
        Ok(())
    }

    async fn repository_exists(&self, target: &Target, name: &str) -> Result<bool, GiteaError> {
        self.status_matches(&format!("/repos/{}/{}", target.name, name), StatusCode::OK)
            .await
    }

    async fn migrate_repository(&self, request: &MigrateRepoRequest) -> Result<(), GiteaError> {
        self.send_expecting(
            Method::POST,
            "/repos/migrate",
            Some(request),
            &[StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    async fn is_starred(&self, target: &Target, name: &str) -> Result<bool, GiteaError> {
        self.status_matches(
            &format!("/user/starred/{}/{}", target.name, name),
            StatusCode::NO_CONTENT,
        )
        .await
    }

    async fn star_repository(&self, target: &Target, name: &str) -> Result<(), GiteaError> {
        self.send_expecting::<()>(
            Method::PUT,
            &format!("/user/starred/{}/{}", target.name, name),
            None,
            &[StatusCode::NO_CONTENT, StatusCode::OK],
        )
        .await?;
        Ok(())
    }

    async fn create_issue(
        &self,
        target: &Target,
        repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<u64, GiteaError> {
        let text = self
            .send_expecting(
                Method::POST,
                &format!("/repos/{}/{}/issues", target.name, repo),
                Some(request),
                &[StatusCode::CREATED],
            )
            .await?;
        let issue: IssueResponse = serde_json::from_str(&text)?;
        Ok(issue.number)
    }

    async fn create_label(
        &self,
        target: &Target,
        repo: &str,
        request: &CreateLabelRequest,
    ) -> Result<(), GiteaError> {
        self.send_expecting(
            Method::POST,
            &format!("/repos/{}/{}/labels", target.name, repo),
            Some(request),
            &[StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    async fn add_issue_labels(
        &self,
        target: &Target,
        repo: &str,
        issue: u64,
        request: &IssueLabelsRequest,
    ) -> Result<(), GiteaError> {
        self.send_expecting(
            Method::POST,
            &format!("/repos/{}/{}/issues/{}/labels", target.name, repo, issue),
            Some(request),
            &[StatusCode::OK],
        )
        .await?;
        Ok(())
    }
}

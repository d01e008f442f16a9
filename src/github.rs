use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::models::issues::Issue;
use octocrab::models::orgs::Organization;
use octocrab::models::{IssueState, Repository as GitHubRepository};
use octocrab::{params, Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::discovery::{Repository, SourceApi, SourceIssue};

/// Items requested per API page
const PER_PAGE: u8 = 100;

/// Safety stop for runaway pagination
const MAX_PAGES: usize = 1000;

/// GitHub client wrapper used as the mirror source
pub struct GitHubClient {
    client: Octocrab,
}

#[derive(Debug, Serialize)]
struct ListParams {
    per_page: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    affiliation: Option<&'static str>,
}

impl ListParams {
    fn new() -> Self {
        Self {
            per_page: PER_PAGE,
            visibility: None,
            affiliation: None,
        }
    }
}

impl GitHubClient {
    /// Create a client, authenticated when a token is given
    pub fn new(token: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder();

        if let Some(token) = token {
            if !looks_like_github_token(token) {
                warn!("GITHUB_TOKEN doesn't look like a valid GitHub token (should start with ghp_, gho_, ghs_ or github_pat_)");
            }
            builder = builder.personal_token(token.to_string());
        } else {
            debug!("No GitHub token configured, using anonymous access");
        }

        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self { client })
    }

    /// Fetch a route and follow its `next` links until exhausted
    async fn list_route<T: DeserializeOwned>(&self, route: &str, params: &ListParams) -> Result<Vec<T>> {
        let first: Page<T> = self
            .client
            .get(route, Some(params))
            .await
            .with_context(|| format!("Failed to fetch {}", route))?;

        self.collect_pages(first, route).await
    }

    /// Drain a paginated listing in page order
    async fn collect_pages<T: DeserializeOwned>(&self, first: Page<T>, what: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut current = Some(first);
        let mut pages = 0usize;

        while let Some(mut page) = current {
            pages += 1;
            items.append(&mut page.items);

            if page.next.is_none() {
                break;
            }
            ensure_within_page_limit(pages, what)?;

            current = self
                .client
                .get_page::<T>(&page.next)
                .await
                .with_context(|| format!("Failed to fetch page {} of {}", pages + 1, what))?;
        }

        debug!("Fetched {} items in {} pages for {}", items.len(), pages, what);
        Ok(items)
    }
}

/// A listing that would need more than `MAX_PAGES` pages is refused rather
/// than returned truncated.
fn ensure_within_page_limit(pages: usize, what: &str) -> Result<()> {
    if pages >= MAX_PAGES {
        error!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, what);
        anyhow::bail!("{} has more than {} pages; refusing a partial listing", what, MAX_PAGES);
    }
    Ok(())
}

fn looks_like_github_token(token: &str) -> bool {
    ["ghp_", "gho_", "ghs_", "ghu_", "github_pat_"]
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Convert an octocrab repository into the normalized record
fn to_repository(repo: GitHubRepository) -> Repository {
    let owner = repo
        .owner
        .as_ref()
        .map(|o| o.login.clone())
        .unwrap_or_default();

    let full_name = repo
        .full_name
        .clone()
        .unwrap_or_else(|| format!("{}/{}", owner, repo.name));

    let clone_url = repo
        .clone_url
        .as_ref()
        .map(|u| u.to_string())
        .unwrap_or_else(|| format!("https://github.com/{}.git", full_name));

    Repository {
        name: repo.name,
        clone_url,
        private: repo.private.unwrap_or(false),
        is_fork: repo.fork.unwrap_or(false),
        owner,
        full_name,
        has_issues: repo.has_issues.unwrap_or(false),
        organization: None,
        starred: false,
    }
}

fn to_repositories(repos: Vec<GitHubRepository>) -> Vec<Repository> {
    repos.into_iter().map(to_repository).collect()
}

fn to_source_issue(issue: Issue) -> SourceIssue {
    SourceIssue {
        title: issue.title,
        body: issue.body.unwrap_or_default(),
        author: issue.user.login,
        created_at: issue.created_at,
        closed: matches!(issue.state, IssueState::Closed),
        labels: issue.labels.into_iter().map(|label| label.name).collect(),
    }
}

#[async_trait]
impl SourceApi for GitHubClient {
    async fn list_user_repositories(&self, username: &str) -> Result<Vec<Repository>> {
        debug!("Fetching public repositories for: {}", username);

        let repos: Vec<GitHubRepository> = self
            .list_route(&format!("/users/{}/repos", username), &ListParams::new())
            .await?;

        info!("Found {} public repositories for {}", repos.len(), username);
        Ok(to_repositories(repos))
    }

    async fn list_private_repositories(&self) -> Result<Vec<Repository>> {
        debug!("Fetching private repositories of the authenticated user");

        let params = ListParams {
            visibility: Some("private"),
            affiliation: Some("owner"),
            ..ListParams::new()
        };
        let repos: Vec<GitHubRepository> = self.list_route("/user/repos", &params).await?;

        info!("Found {} private repositories", repos.len());
        Ok(to_repositories(repos))
    }

    async fn list_starred_repositories(&self, username: Option<&str>) -> Result<Vec<Repository>> {
        let route = match username {
            Some(user) => format!("/users/{}/starred", user),
            None => "/user/starred".to_string(),
        };
        debug!("Fetching starred repositories from {}", route);

        let repos: Vec<GitHubRepository> = self.list_route(&route, &ListParams::new()).await?;

        info!("Found {} starred repositories", repos.len());
        Ok(to_repositories(repos))
    }

    async fn list_organizations(&self, username: Option<&str>) -> Result<Vec<String>> {
        let route = match username {
            Some(user) => format!("/users/{}/orgs", user),
            None => "/user/orgs".to_string(),
        };

        let orgs: Vec<Organization> = self.list_route(&route, &ListParams::new()).await?;
        let org_names: Vec<String> = orgs.into_iter().map(|org| org.login).collect();

        info!("Found {} organizations: {:?}", org_names.len(), org_names);
        Ok(org_names)
    }

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        debug!("Fetching public repositories for organization: {}", org);

        let first = self
            .client
            .orgs(org)
            .list_repos()
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Failed to fetch repositories for organization {}", org))?;

        let repos = self.collect_pages(first, org).await?;
        Ok(to_repositories(repos))
    }

    async fn search_organization_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        info!(
            "Using search API to fetch both public and private repositories for org: {}",
            org
        );

        let query = format!("org:{}", org);
        let first = self
            .client
            .search()
            .repositories(&query)
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Failed to search repositories for organization {}", org))?;

        let repos = self.collect_pages(first, &query).await?;
        Ok(to_repositories(repos))
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let repo = self
            .client
            .repos(owner, name)
            .get()
            .await
            .with_context(|| format!("Error fetching single repository {}/{}", owner, name))?;

        Ok(to_repository(repo))
    }

    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<SourceIssue>> {
        let first = self
            .client
            .issues(owner, name)
            .list()
            .state(params::State::All)
            .sort(params::issues::Sort::Created)
            .direction(params::Direction::Ascending)
            .per_page(PER_PAGE)
            .send()
            .await
            .with_context(|| format!("Error fetching issues for {}/{}", owner, name))?;

        let issues = self
            .collect_pages(first, &format!("issues of {}/{}", owner, name))
            .await?;

        Ok(issues.into_iter().map(to_source_issue).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_shape() {
        assert!(looks_like_github_token("ghp_abc"));
        assert!(looks_like_github_token("github_pat_abc"));
        assert!(!looks_like_github_token("abc"));
    }

    #[test]
    fn test_list_params_serialization() {
        let params = ListParams {
            visibility: Some("private"),
            affiliation: Some("owner"),
            ..ListParams::new()
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"per_page": 100, "visibility": "private", "affiliation": "owner"})
        );
        assert_eq!(
            serde_json::to_value(ListParams::new()).unwrap(),
            json!({"per_page": 100})
        );
    }

    #[test]
    fn test_to_repository_normalizes_fields() {
        let repo: GitHubRepository = serde_json::from_value(json!({
            "id": 1,
            "name": "tool",
            "url": "https://api.github.com/repos/octo/tool",
            "full_name": "octo/tool",
            "clone_url": "https://github.com/octo/tool.git",
            "private": true,
            "fork": false,
            "has_issues": true
        }))
        .expect("minimal repository");

        let normalized = to_repository(repo);
        assert_eq!(normalized.name, "tool");
        assert_eq!(normalized.full_name, "octo/tool");
        assert_eq!(normalized.clone_url, "https://github.com/octo/tool.git");
        assert!(normalized.private);
        assert!(!normalized.is_fork);
        assert!(normalized.has_issues);
        assert!(!normalized.starred);
        assert!(normalized.organization.is_none());
    }

    #[test]
    fn test_to_repository_falls_back_to_full_name() {
        let repo: GitHubRepository = serde_json::from_value(json!({
            "id": 2,
            "name": "bare",
            "url": "https://api.github.com/repos/octo/bare",
            "full_name": "octo/bare"
        }))
        .expect("minimal repository");

        let normalized = to_repository(repo);
        assert_eq!(normalized.clone_url, "https://github.com/octo/bare.git");
        assert!(!normalized.private);
        assert!(!normalized.has_issues);
    }

    #[tokio::test]
    async fn test_client_without_token() {
        assert!(GitHubClient::new(None).is_ok());
    }

    #[test]
    fn test_page_limit_refuses_partial_listing() {
        assert!(ensure_within_page_limit(1, "/user/starred").is_ok());
        assert!(ensure_within_page_limit(MAX_PAGES - 1, "/user/starred").is_ok());

        let err = ensure_within_page_limit(MAX_PAGES, "/user/starred").unwrap_err();
        assert!(err.to_string().contains("/user/starred"));
    }
}

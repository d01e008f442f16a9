//! Common test utilities: in-memory source and destination fakes

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use gitea_mirror::discovery::SourceIssue;
use gitea_mirror::gitea::{
    CreateIssueRequest, CreateLabelRequest, CreateOrganizationRequest, GiteaError,
    IssueLabelsRequest, MigrateRepoRequest, TargetKind,
};
use gitea_mirror::{Config, DestinationApi, Repository, SourceApi, Target};

/// Minimal valid configuration for engine tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.github.username = "octo".to_string();
    config.github.token = Some("ghp_test".to_string());
    config.gitea.url = "https://gitea.example.com".to_string();
    config.gitea.token = "gitea-token".to_string();
    config
}

pub fn repo(name: &str) -> Repository {
    Repository {
        name: name.to_string(),
        clone_url: format!("https://github.com/octo/{}.git", name),
        private: false,
        is_fork: false,
        owner: "octo".to_string(),
        full_name: format!("octo/{}", name),
        has_issues: true,
        organization: None,
        starred: false,
    }
}

pub fn org_repo(org: &str, name: &str) -> Repository {
    Repository {
        clone_url: format!("https://github.com/{}/{}.git", org, name),
        owner: org.to_string(),
        full_name: format!("{}/{}", org, name),
        ..repo(name)
    }
}

pub fn issue(title: &str, closed: bool, labels: &[&str]) -> SourceIssue {
    SourceIssue {
        title: title.to_string(),
        body: format!("body of {}", title),
        author: "alice".to_string(),
        created_at: Utc.with_ymd_and_hms(2022, 5, 17, 8, 0, 0).unwrap(),
        closed,
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

/// Source backed by fixed listings
#[derive(Default)]
pub struct FakeSource {
    pub owned: Vec<Repository>,
    pub private: Vec<Repository>,
    pub starred: Vec<Repository>,
    pub organizations: Vec<String>,
    pub org_repos: HashMap<String, Vec<Repository>>,
    pub failing_orgs: HashSet<String>,
    pub fail_owned: bool,
    pub fail_private: bool,
    pub fail_starred: bool,
    pub fail_organizations: bool,
    pub fail_issues: bool,
    pub singles: HashMap<String, Repository>,
    pub issues: HashMap<String, Vec<SourceIssue>>,
    /// Organizations fetched through search, in call order
    pub searched: Mutex<Vec<String>>,
    /// Organizations fetched through the public listing, in call order
    pub listed: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    fn org_listing(&self, org: &str) -> Result<Vec<Repository>> {
        if self.failing_orgs.contains(org) {
            return Err(anyhow!("403 Forbidden for {}", org));
        }
        Ok(self.org_repos.get(org).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_user_repositories(&self, _username: &str) -> Result<Vec<Repository>> {
        if self.fail_owned {
            return Err(anyhow!("API rate limit exceeded"));
        }
        Ok(self.owned.clone())
    }

    async fn list_private_repositories(&self) -> Result<Vec<Repository>> {
        if self.fail_private {
            return Err(anyhow!("502 Bad Gateway"));
        }
        Ok(self.private.clone())
    }

    async fn list_starred_repositories(&self, _username: Option<&str>) -> Result<Vec<Repository>> {
        if self.fail_starred {
            return Err(anyhow!("connection reset while paging starred"));
        }
        Ok(self.starred.clone())
    }

    async fn list_organizations(&self, _username: Option<&str>) -> Result<Vec<String>> {
        if self.fail_organizations {
            return Err(anyhow!("401 Bad credentials"));
        }
        Ok(self.organizations.clone())
    }

    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        self.listed.lock().unwrap().push(org.to_string());
        self.org_listing(org)
    }

    async fn search_organization_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        self.searched.lock().unwrap().push(org.to_string());
        self.org_listing(org)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let key = format!("{}/{}", owner, name);
        self.singles
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {}", key))
    }

    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<SourceIssue>> {
        if self.fail_issues {
            return Err(anyhow!("issues unavailable"));
        }
        Ok(self
            .issues
            .get(&format!("{}/{}", owner, name))
            .cloned()
            .unwrap_or_default())
    }
}

/// Mutating request observed by [`FakeDestination`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOrganization(String),
    Migrate(MigrateRepoRequest),
    Star { owner: String, repo: String },
    CreateIssue { repo: String, request: CreateIssueRequest },
    CreateLabel { repo: String, name: String },
    AddLabels { repo: String, issue: u64, labels: Vec<String> },
}

#[derive(Default)]
struct DestinationState {
    organizations: HashMap<String, Target>,
    repositories: HashSet<(String, String)>,
    starred: HashSet<(String, String)>,
    labels: HashSet<(String, String)>,
    calls: Vec<Call>,
    next_id: i64,
    next_issue: u64,
}

fn status(code: u16, message: &str) -> GiteaError {
    GiteaError::Status {
        status: code,
        message: message.to_string(),
    }
}

/// In-memory destination that records every mutating call
pub struct FakeDestination {
    pub user: Target,
    pub fail_migrate: HashSet<String>,
    pub fail_existence: HashSet<String>,
    pub fail_star: bool,
    pub fail_org_create: bool,
    pub fail_issue_titles: HashSet<String>,
    pub fail_label_attach: HashSet<String>,
    state: Mutex<DestinationState>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self {
            user: Target {
                id: 1,
                name: "mirror-bot".to_string(),
                kind: TargetKind::User,
            },
            fail_migrate: HashSet::new(),
            fail_existence: HashSet::new(),
            fail_star: false,
            fail_org_create: false,
            fail_issue_titles: HashSet::new(),
            fail_label_attach: HashSet::new(),
            state: Mutex::new(DestinationState {
                next_id: 100,
                next_issue: 1,
                ..Default::default()
            }),
        }
    }

    /// Pre-existing organization
    pub fn with_organization(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.organizations.insert(
                name.to_string(),
                Target {
                    id,
                    name: name.to_string(),
                    kind: TargetKind::Organization,
                },
            );
        }
        self
    }

    /// Pre-existing repository under `owner`
    pub fn with_repository(self, owner: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .repositories
            .insert((owner.to_string(), name.to_string()));
        self
    }

    /// Pre-existing star on `owner/name`
    pub fn with_star(self, owner: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .starred
            .insert((owner.to_string(), name.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn migrations(&self) -> Vec<MigrateRepoRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Migrate(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn has_repository(&self, owner: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .repositories
            .contains(&(owner.to_string(), name.to_string()))
    }

    pub fn organization(&self, name: &str) -> Option<Target> {
        self.state.lock().unwrap().organizations.get(name).cloned()
    }

    fn owner_of(state: &DestinationState, user: &Target, uid: i64) -> Option<String> {
        if uid == user.id {
            return Some(user.name.clone());
        }
        state
            .organizations
            .values()
            .find(|target| target.id == uid)
            .map(|target| target.name.clone())
    }
}

#[async_trait]
impl DestinationApi for FakeDestination {
    async fn current_user(&self) -> Result<Target, GiteaError> {
        Ok(self.user.clone())
    }

    async fn get_organization(&self, name: &str) -> Result<Target, GiteaError> {
        self.organization(name)
            .ok_or_else(|| status(404, "organization not found"))
    }

    async fn create_organization(&self, request: &CreateOrganizationRequest) -> Result<(), GiteaError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::CreateOrganization(request.username.clone()));

        if self.fail_org_create {
            return Err(status(403, "forbidden"));
        }
        if !state.organizations.contains_key(&request.username) {
            let id = state.next_id;
            state.next_id += 1;
            state.organizations.insert(
                request.username.clone(),
                Target {
                    id,
                    name: request.username.clone(),
                    kind: TargetKind::Organization,
                },
            );
        }
        Ok(())
    }

    async fn repository_exists(&self, target: &Target, name: &str) -> Result<bool, GiteaError> {
        if self.fail_existence.contains(name) {
            return Err(status(500, "internal error"));
        }
        Ok(self.has_repository(&target.name, name))
    }

    async fn migrate_repository(&self, request: &MigrateRepoRequest) -> Result<(), GiteaError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Migrate(request.clone()));

        if self.fail_migrate.contains(&request.repo_name) {
            return Err(status(500, "migration failed"));
        }
        let owner = Self::owner_of(&state, &self.user, request.uid)
            .ok_or_else(|| status(422, "unknown uid"))?;
        state.repositories.insert((owner, request.repo_name.clone()));
        Ok(())
    }

    async fn is_starred(&self, target: &Target, name: &str) -> Result<bool, GiteaError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .starred
            .contains(&(target.name.clone(), name.to_string())))
    }

    async fn star_repository(&self, target: &Target, name: &str) -> Result<(), GiteaError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Star {
            owner: target.name.clone(),
            repo: name.to_string(),
        });

        if self.fail_star {
            return Err(status(500, "star failed"));
        }
        state.starred.insert((target.name.clone(), name.to_string()));
        Ok(())
    }

    async fn create_issue(
        &self,
        _target: &Target,
        repo: &str,
        request: &CreateIssueRequest,
    ) -> Result<u64, GiteaError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateIssue {
            repo: repo.to_string(),
            request: request.clone(),
        });

        if self.fail_issue_titles.contains(&request.title) {
            return Err(status(500, "issue failed"));
        }
        let number = state.next_issue;
        state.next_issue += 1;
        Ok(number)
    }

    async fn create_label(
        &self,
        _target: &Target,
        repo: &str,
        request: &CreateLabelRequest,
    ) -> Result<(), GiteaError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateLabel {
            repo: repo.to_string(),
            name: request.name.clone(),
        });

        if !state
            .labels
            .insert((repo.to_string(), request.name.clone()))
        {
            return Err(status(422, "label already exists"));
        }
        Ok(())
    }

    async fn add_issue_labels(
        &self,
        _target: &Target,
        repo: &str,
        issue: u64,
        request: &IssueLabelsRequest,
    ) -> Result<(), GiteaError> {
        self.state.lock().unwrap().calls.push(Call::AddLabels {
            repo: repo.to_string(),
            issue,
            labels: request.labels.clone(),
        });

        if request
            .labels
            .iter()
            .any(|label| self.fail_label_attach.contains(label))
        {
            return Err(status(500, "attach failed"));
        }
        Ok(())
    }
}

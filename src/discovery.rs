//! Repository discovery on the source side
//!
//! This module defines the normalized [`Repository`] record, the [`SourceApi`]
//! seam the GitHub client implements, and the collector that assembles one
//! deduplicated repository set from every enabled collection mode.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, MirrorError};

/// Normalized view of one source repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository name, reused as the mirror name at the destination
    pub name: String,

    /// Address used to seed the mirror; global identity key for dedup
    pub clone_url: String,

    pub private: bool,

    pub is_fork: bool,

    pub owner: String,

    pub full_name: String,

    pub has_issues: bool,

    /// Source organization, set only when org-structure preservation is on
    pub organization: Option<String>,

    /// Arrived through the starred-repositories collection
    pub starred: bool,
}

/// Reference to a single repository (`owner/name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = ConfigError;

    /// Accepts `owner/name`, `https://github.com/owner/name` and either form
    /// with a trailing `.git`
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let path = token.trim();
        let path = path.strip_prefix("https://github.com/").unwrap_or(path);
        let path = path.strip_suffix(".git").unwrap_or(path);

        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(RepoRef {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ConfigError::InvalidRepository(token.to_string())),
        }
    }
}

/// Issue as listed on the source
#[derive(Debug, Clone)]
pub struct SourceIssue {
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub closed: bool,
    pub labels: Vec<String>,
}

/// Read-only operations consumed from the source hosting service
///
/// Every listing returns the complete, fully paginated result in source order.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Public repositories of `username`
    async fn list_user_repositories(&self, username: &str) -> Result<Vec<Repository>>;

    /// Private repositories owned by the authenticated identity
    async fn list_private_repositories(&self) -> Result<Vec<Repository>>;

    /// Starred repositories of `username`, or of the authenticated user when `None`
    async fn list_starred_repositories(&self, username: Option<&str>) -> Result<Vec<Repository>>;

    /// Organization logins visible to `username`, or to the authenticated user when `None`
    async fn list_organizations(&self, username: Option<&str>) -> Result<Vec<String>>;

    /// Public repositories of an organization
    async fn list_organization_repositories(&self, org: &str) -> Result<Vec<Repository>>;

    /// Public and private repositories of an organization through search
    async fn search_organization_repositories(&self, org: &str) -> Result<Vec<Repository>>;

    /// Single repository lookup
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository>;

    /// All issues of a repository, any state, oldest page first
    async fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<SourceIssue>>;
}

/// Collection settings derived from the run configuration
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub username: String,
    pub private_repositories: bool,
    pub skip_forks: bool,
    pub mirror_starred: bool,
    pub mirror_organizations: bool,
    pub single_repo: Option<String>,
    pub include_orgs: Vec<String>,
    pub exclude_orgs: Vec<String>,
    pub preserve_org_structure: bool,
    pub use_specific_user: bool,
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        let github = &config.github;
        Self {
            username: github.username.clone(),
            private_repositories: github.private_repositories,
            skip_forks: github.skip_forks,
            mirror_starred: github.mirror_starred,
            mirror_organizations: github.mirror_organizations,
            single_repo: github.single_repo.clone(),
            include_orgs: github.include_orgs.clone(),
            exclude_orgs: github.exclude_orgs.clone(),
            preserve_org_structure: github.preserve_org_structure,
            use_specific_user: github.use_specific_user,
        }
    }
}

impl FetchOptions {
    fn specific_user(&self) -> Option<&str> {
        self.use_specific_user.then_some(self.username.as_str())
    }
}

/// Gather repositories from every enabled collection mode
///
/// Single-repository mode short-circuits all other modes and skips dedup.
/// Otherwise the modes run in the order owned, private, starred,
/// organizations, and the first record seen per clone URL wins.
pub async fn collect_repositories<S>(
    source: &S,
    opts: &FetchOptions,
) -> Result<Vec<Repository>, MirrorError>
where
    S: SourceApi + ?Sized,
{
    let mut repositories = Vec::new();

    if let Some(token) = &opts.single_repo {
        let repo_ref: RepoRef = token.parse()?;

        let repo = source
            .get_repository(&repo_ref.owner, &repo_ref.name)
            .await
            .map_err(|source| MirrorError::SourceFetch {
                collection: "single",
                source,
            })?;
        repositories.push(repo);
    } else {
        let owned = source
            .list_user_repositories(&opts.username)
            .await
            .map_err(|source| MirrorError::SourceFetch {
                collection: "public",
                source,
            })?;
        debug!("Collected {} owned repositories", owned.len());
        repositories.extend(owned);

        if opts.private_repositories {
            let private = source
                .list_private_repositories()
                .await
                .map_err(|source| MirrorError::SourceFetch {
                    collection: "private",
                    source,
                })?;
            debug!("Collected {} private repositories", private.len());
            repositories.extend(private);
        }

        if opts.mirror_starred {
            let starred = source
                .list_starred_repositories(opts.specific_user())
                .await
                .map_err(|source| MirrorError::SourceFetch {
                    collection: "starred",
                    source,
                })?;
            debug!("Collected {} starred repositories", starred.len());
            repositories.extend(starred.into_iter().map(|repo| Repository {
                starred: true,
                ..repo
            }));
        }

        if opts.mirror_organizations {
            let org_repos = collect_organization_repositories(source, opts).await?;
            repositories.extend(org_repos);
        }

        repositories = dedup_by_clone_url(repositories);
    }

    if opts.skip_forks {
        repositories = without_forks(repositories);
    }

    Ok(repositories)
}

async fn collect_organization_repositories<S>(
    source: &S,
    opts: &FetchOptions,
) -> Result<Vec<Repository>, MirrorError>
where
    S: SourceApi + ?Sized,
{
    let organizations = source
        .list_organizations(opts.specific_user())
        .await
        .map_err(|source| MirrorError::SourceFetch {
            collection: "organization",
            source,
        })?;

    let selected = select_organizations(organizations, &opts.include_orgs, &opts.exclude_orgs);
    info!("Processing repositories from {} organizations", selected.len());

    let mut all_org_repos = Vec::new();

    for org in selected {
        info!("Fetching repositories for organization: {}", org);

        let fetched = if opts.private_repositories {
            source.search_organization_repositories(&org).await
        } else {
            source.list_organization_repositories(&org).await
        };

        let repos = match fetched {
            Ok(repos) => repos,
            Err(source) => {
                let error = MirrorError::OrganizationFetch {
                    org: org.clone(),
                    source,
                };
                warn!("{}", error);
                continue;
            }
        };

        info!(
            "Found {} {} repositories for org: {}",
            repos.len(),
            if opts.private_repositories {
                "public and private"
            } else {
                "public"
            },
            org
        );

        if opts.preserve_org_structure {
            all_org_repos.extend(repos.into_iter().map(|repo| Repository {
                organization: Some(org.clone()),
                ..repo
            }));
        } else {
            all_org_repos.extend(repos);
        }
    }

    Ok(all_org_repos)
}

/// Apply the organization include list, then the exclude list (exclude wins)
pub fn select_organizations(
    organizations: Vec<String>,
    include: &[String],
    exclude: &[String],
) -> Vec<String> {
    organizations
        .into_iter()
        .filter(|org| include.is_empty() || include.contains(org))
        .filter(|org| !exclude.contains(org))
        .collect()
}

/// Keep the first-seen record per clone URL
pub fn dedup_by_clone_url(repositories: Vec<Repository>) -> Vec<Repository> {
    let mut seen = HashSet::new();
    repositories
        .into_iter()
        .filter(|repo| seen.insert(repo.clone_url.clone()))
        .collect()
}

/// Drop every fork
pub fn without_forks(repositories: Vec<Repository>) -> Vec<Repository> {
    repositories.into_iter().filter(|repo| !repo.is_fork).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn repo(name: &str, url: &str) -> Repository {
        Repository {
            name: name.to_string(),
            clone_url: url.to_string(),
            private: false,
            is_fork: false,
            owner: "octo".to_string(),
            full_name: format!("octo/{}", name),
            has_issues: true,
            organization: None,
            starred: false,
        }
    }

    #[test]
    fn test_repo_ref_forms() {
        let expected = RepoRef {
            owner: "octo".to_string(),
            name: "hello".to_string(),
        };
        assert_eq!("octo/hello".parse::<RepoRef>().unwrap(), expected);
        assert_eq!("octo/hello.git".parse::<RepoRef>().unwrap(), expected);
        assert_eq!(
            "https://github.com/octo/hello".parse::<RepoRef>().unwrap(),
            expected
        );
        assert_eq!(
            "https://github.com/octo/hello.git".parse::<RepoRef>().unwrap(),
            expected
        );
    }

    #[test]
    fn test_repo_ref_rejects_malformed() {
        for token in ["hello", "a/b/c", "/hello", "octo/", "https://github.com/octo"] {
            assert!(
                token.parse::<RepoRef>().is_err(),
                "{} should be rejected",
                token
            );
        }
    }

    #[test]
    fn test_dedup_keeps_first_seen() {
        let owned = repo("tool", "https://github.com/octo/tool.git");
        let starred = Repository {
            starred: true,
            ..owned.clone()
        };
        let other = repo("other", "https://github.com/octo/other.git");

        let result = dedup_by_clone_url(vec![owned.clone(), other.clone(), starred]);

        assert_eq!(result, vec![owned, other]);
        assert!(!result[0].starred);
    }

    #[test]
    fn test_without_forks() {
        let mut fork = repo("fork", "u1");
        fork.is_fork = true;
        let keep = repo("keep", "u2");

        assert_eq!(without_forks(vec![fork, keep.clone()]), vec![keep]);
    }

    #[test]
    fn test_select_organizations_exclude_wins() {
        let orgs = vec!["acme".to_string(), "widgets".to_string(), "other".to_string()];

        let include = vec!["acme".to_string(), "widgets".to_string()];
        let exclude = vec!["widgets".to_string()];
        assert_eq!(
            select_organizations(orgs.clone(), &include, &exclude),
            vec!["acme".to_string()]
        );

        assert_eq!(select_organizations(orgs.clone(), &[], &[]), orgs);
        assert_eq!(
            select_organizations(orgs, &[], &exclude),
            vec!["acme".to_string(), "other".to_string()]
        );
    }

    #[quickcheck]
    fn prop_dedup_yields_unique_urls(urls: Vec<u8>) -> bool {
        let repos: Vec<Repository> = urls
            .iter()
            .enumerate()
            .map(|(i, u)| repo(&format!("r{}", i), &format!("url-{}", u % 8)))
            .collect();

        let deduped = dedup_by_clone_url(repos.clone());
        let unique: HashSet<_> = deduped.iter().map(|r| r.clone_url.clone()).collect();

        // every surviving record is the first one seen for its URL
        let first_seen_preserved = deduped.iter().all(|kept| {
            repos
                .iter()
                .find(|r| r.clone_url == kept.clone_url)
                .map(|first| first.name == kept.name)
                .unwrap_or(false)
        });

        unique.len() == deduped.len() && first_seen_preserved
    }
}

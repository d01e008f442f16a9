//! Error taxonomy for a mirror run.
//!
//! Failures are split by blast radius:
//!
//! - [`ConfigError`] aborts before any network activity.
//! - [`MirrorError`] is either fatal to the run ([`MirrorError::SourceFetch`])
//!   or fatal to a single repository (everything else).
//! - [`MirrorWarning`] covers best-effort side actions such as starring or
//!   issue replication. There is no conversion into [`MirrorError`]; a
//!   warning cannot be `?`-propagated as a failure.

use thiserror::Error;

/// Invalid or incomplete run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration, please provide {0}")]
    Missing(&'static str),

    #[error("invalid configuration, {0}")]
    Invalid(String),

    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that end either the whole run or the processing of one repository.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Owned, private or starred collection failed; the run cannot continue.
    #[error("failed to fetch {collection} repositories: {source}")]
    SourceFetch {
        collection: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// One organization's listing failed; the collector skips it.
    #[error("failed to fetch repositories for organization {org}: {source}")]
    OrganizationFetch {
        org: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to check whether {repo} exists in {target}: {source}")]
    ExistenceCheck {
        repo: String,
        target: String,
        #[source]
        source: crate::gitea::GiteaError,
    },

    #[error("failed to mirror repository {repo}: {source}")]
    MirrorCreate {
        repo: String,
        #[source]
        source: crate::gitea::GiteaError,
    },

    #[error("failed to get destination user: {0}")]
    DestinationUser(#[source] crate::gitea::GiteaError),
}

/// Recovered problems: logged at WARN and never block subsequent work.
#[derive(Debug, Error)]
pub enum MirrorWarning {
    #[error("could not resolve organization {org}, using default target: {reason}")]
    TargetResolution { org: String, reason: String },

    #[error("failed to prepare organization {org}: {source}")]
    OrganizationSetup {
        org: String,
        #[source]
        source: crate::gitea::GiteaError,
    },

    #[error("failed to star repository {repo}: {source}")]
    Star {
        repo: String,
        #[source]
        source: crate::gitea::GiteaError,
    },

    #[error("failed to fetch issues for {repo}: {source}")]
    IssueFetch {
        repo: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create issue '{title}' in {repo}: {source}")]
    IssueCreate {
        repo: String,
        title: String,
        #[source]
        source: crate::gitea::GiteaError,
    },

    #[error("failed to add label {label} to issue #{issue} in {repo}: {source}")]
    Label {
        repo: String,
        issue: u64,
        label: String,
        #[source]
        source: crate::gitea::GiteaError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitea::GiteaError;

    #[test]
    fn test_messages_name_the_repository() {
        let warning = MirrorWarning::Label {
            repo: "lib-a".to_string(),
            issue: 7,
            label: "bug".to_string(),
            source: GiteaError::Status {
                status: 422,
                message: String::new(),
            },
        };
        let message = warning.to_string();
        assert!(message.contains("lib-a"));
        assert!(message.contains("#7"));
        assert!(message.contains("bug"));

        let config = ConfigError::Missing("GITEA_URL");
        assert_eq!(
            config.to_string(),
            "invalid configuration, please provide GITEA_URL"
        );
    }
}

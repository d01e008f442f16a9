use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::discovery::RepoRef;
use crate::error::ConfigError;

const REDACTED: &str = "[REDACTED]";

/// Immutable configuration snapshot for one mirror run
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub (source) settings
    pub github: SourceConfig,

    /// Gitea (destination) settings
    pub gitea: DestinationConfig,

    /// Repository name filters
    #[serde(default)]
    pub filters: FilterConfig,

    /// Run cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Log intended mutations without issuing them
    #[serde(default)]
    pub dry_run: bool,
}

/// GitHub source configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SourceConfig {
    /// Account whose repositories are mirrored
    pub username: String,

    /// Personal access token; required for anything beyond public repositories
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub skip_forks: bool,

    #[serde(default)]
    pub private_repositories: bool,

    #[serde(default)]
    pub mirror_issues: bool,

    #[serde(default)]
    pub mirror_starred: bool,

    #[serde(default)]
    pub mirror_organizations: bool,

    /// Query starred repositories and organizations of `username` instead of
    /// the token's owner
    #[serde(default)]
    pub use_specific_user: bool,

    /// Mirror only this repository (`owner/name` or a GitHub URL)
    #[serde(default)]
    pub single_repo: Option<String>,

    #[serde(default)]
    pub include_orgs: Vec<String>,

    #[serde(default)]
    pub exclude_orgs: Vec<String>,

    /// Mirror organization repositories into like-named Gitea organizations
    #[serde(default)]
    pub preserve_org_structure: bool,

    #[serde(default)]
    pub skip_starred_issues: bool,
}

/// Gitea destination configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DestinationConfig {
    /// Base URL of the Gitea instance
    pub url: String,

    /// Gitea access token
    pub token: String,

    /// Default organization for mirrors (the authenticated user otherwise)
    #[serde(default)]
    pub organization: Option<String>,

    /// Visibility used when creating organizations
    #[serde(default)]
    pub visibility: Visibility,

    /// Organization receiving starred repositories
    #[serde(default = "default_starred_repos_org")]
    pub starred_repos_org: Option<String>,
}

/// Repository name filtering
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    /// Glob patterns a repository name must match at least once
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Glob patterns that drop a repository on any match
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Run cadence
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Seconds between runs
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Exit after the first run
    #[serde(default)]
    pub single_run: bool,
}

/// Visibility of organizations created at the destination
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Limited,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Limited => "limited",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "limited" => Ok(Visibility::Limited),
            "private" => Ok(Visibility::Private),
            other => Err(ConfigError::Invalid(format!(
                "unknown organization visibility '{}' (expected public, limited or private)",
                other
            ))),
        }
    }
}

// Default value functions
fn default_starred_repos_org() -> Option<String> {
    Some("github".to_string())
}
fn default_include() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_delay() -> u64 {
    3600
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            organization: None,
            visibility: Visibility::default(),
            starred_repos_org: default_starred_repos_org(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            delay: default_delay(),
            single_run: false,
        }
    }
}

fn read_bool(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("true" | "TRUE" | "1"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn split_and_trim(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Resolve configuration: explicit file, then the XDG default file, then
    /// environment variables
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_config_path() {
            Some(default_path) if default_path.exists() => {
                tracing::debug!("Using configuration file {:?}", default_path);
                Self::load(&default_path)
            }
            _ => Self::from_env(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load a YAML file, expanding `${VAR}` references through `lookup`
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Config =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        config.expand_variables(&lookup)?;
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let must = |key: &'static str| non_empty(lookup(key)).ok_or(ConfigError::Missing(key));

        let username = must("GITHUB_USERNAME")?;
        let url = must("GITEA_URL")?;
        let gitea_token = must("GITEA_TOKEN")?;

        let include = non_empty(lookup("INCLUDE"))
            .map(|raw| split_and_trim(&raw))
            .unwrap_or_else(default_include);
        let exclude = non_empty(lookup("EXCLUDE"))
            .map(|raw| split_and_trim(&raw))
            .unwrap_or_default();

        let visibility = match non_empty(lookup("GITEA_ORG_VISIBILITY")) {
            Some(raw) => raw.parse()?,
            None => Visibility::default(),
        };

        let delay = non_empty(lookup("DELAY"))
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or_else(default_delay);

        let config = Config {
            github: SourceConfig {
                username,
                token: non_empty(lookup("GITHUB_TOKEN")),
                skip_forks: read_bool(lookup("SKIP_FORKS")),
                private_repositories: read_bool(lookup("MIRROR_PRIVATE_REPOSITORIES")),
                mirror_issues: read_bool(lookup("MIRROR_ISSUES")),
                mirror_starred: read_bool(lookup("MIRROR_STARRED")),
                mirror_organizations: read_bool(lookup("MIRROR_ORGANIZATIONS")),
                use_specific_user: read_bool(lookup("USE_SPECIFIC_USER")),
                single_repo: non_empty(lookup("SINGLE_REPO")),
                include_orgs: split_and_trim(&lookup("INCLUDE_ORGS").unwrap_or_default()),
                exclude_orgs: split_and_trim(&lookup("EXCLUDE_ORGS").unwrap_or_default()),
                preserve_org_structure: read_bool(lookup("PRESERVE_ORG_STRUCTURE")),
                skip_starred_issues: read_bool(lookup("SKIP_STARRED_ISSUES")),
            },
            gitea: DestinationConfig {
                url,
                token: gitea_token,
                organization: non_empty(lookup("GITEA_ORGANIZATION")),
                visibility,
                starred_repos_org: non_empty(lookup("GITEA_STARRED_ORGANIZATION"))
                    .or_else(default_starred_repos_org),
            },
            filters: FilterConfig { include, exclude },
            schedule: ScheduleConfig {
                delay,
                single_run: read_bool(lookup("SINGLE_RUN")),
            },
            dry_run: read_bool(lookup("DRY_RUN")),
        };

        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("gitea-mirror").join("config.yml"))
    }

    /// Expand `${VAR}` and `~` in credentials and URLs read from a file
    fn expand_variables<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expand = |value: &str, field: &str| -> Result<String, ConfigError> {
            shellexpand::full_with_context(
                value,
                || dirs::home_dir().map(|home| home.to_string_lossy().into_owned()),
                |var| lookup(var).map(Some).ok_or(std::env::VarError::NotPresent),
            )
            .map(|expanded| expanded.into_owned())
            .map_err(|e| ConfigError::Invalid(format!("cannot expand {}: {}", field, e)))
        };

        self.github.username = expand(&self.github.username, "github.username")?;
        if let Some(token) = &self.github.token {
            self.github.token = Some(expand(token, "github.token")?);
        }
        self.gitea.url = expand(&self.gitea.url, "gitea.url")?;
        self.gitea.token = expand(&self.gitea.token, "gitea.token")?;

        Ok(())
    }

    /// Collapse empty optional strings from files into `None`
    fn normalize(&mut self) {
        self.github.token = non_empty(self.github.token.take());
        self.github.single_repo = non_empty(self.github.single_repo.take());
        self.gitea.organization = non_empty(self.gitea.organization.take());
        self.gitea.starred_repos_org = non_empty(self.gitea.starred_repos_org.take());
    }

    /// Check mandatory settings and credential preconditions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.username.is_empty() {
            return Err(ConfigError::Missing("GITHUB_USERNAME"));
        }
        if self.gitea.url.is_empty() {
            return Err(ConfigError::Missing("GITEA_URL"));
        }
        if self.gitea.token.is_empty() {
            return Err(ConfigError::Missing("GITEA_TOKEN"));
        }

        let has_token = self.github.token.is_some();

        if self.github.private_repositories && !has_token {
            return Err(ConfigError::Invalid(
                "mirroring private repositories requires setting GITHUB_TOKEN".to_string(),
            ));
        }

        let needs_token = self.github.mirror_issues
            || self.github.mirror_starred
            || self.github.mirror_organizations
            || self.github.single_repo.is_some();
        if needs_token && !has_token {
            return Err(ConfigError::Invalid(
                "mirroring issues, starred repositories, organizations, or a single repo requires setting GITHUB_TOKEN"
                    .to_string(),
            ));
        }

        if let Some(single) = &self.github.single_repo {
            single.parse::<RepoRef>()?;
        }

        Ok(())
    }

    /// Whether the source credential must accompany every mirror request
    pub fn source_credential_required(&self) -> bool {
        self.github.private_repositories
            || self.github.mirror_starred
            || self.github.mirror_organizations
            || self.github.single_repo.is_some()
    }

    /// Pretty JSON of this configuration with both credentials redacted
    pub fn redacted(&self) -> String {
        let mut shown = self.clone();
        if shown.github.token.is_some() {
            shown.github.token = Some(REDACTED.to_string());
        }
        shown.gitea.token = REDACTED.to_string();

        serde_json::to_string_pretty(&shown).unwrap_or_else(|e| format!("<unprintable: {}>", e))
    }
}

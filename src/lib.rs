//! gitea-mirror - Mirror GitHub repositories into Gitea
//!
//! Each run discovers the repositories a GitHub account owns, stars or can
//! reach through its organizations, filters them by name, decides which Gitea
//! user or organization should own each mirror and then creates the missing
//! pull mirrors. Starred repositories can be re-starred at the destination and
//! issues can be copied into freshly created mirrors.
//!
//! ## Modules
//!
//! - [`config`]: Configuration from YAML or environment variables
//! - [`discovery`]: Repository model, source seam and collector
//! - [`filter`]: Include/exclude name globs
//! - [`target`]: Destination target resolution
//! - [`sync`]: The per-repository mirror state machine
//! - [`issues`]: Issue replication
//! - [`daemon`]: Delay-based scheduler
//! - [`github`] / [`gitea`]: API clients

pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod gitea;
pub mod github;
pub mod issues;
pub mod sync;
pub mod target;

pub use config::Config;
pub use daemon::Scheduler;
pub use discovery::{Repository, SourceApi};
pub use error::{ConfigError, MirrorError, MirrorWarning};
pub use gitea::{DestinationApi, GiteaClient, Target};
pub use github::GitHubClient;
pub use sync::{MirrorEngine, RunSummary};

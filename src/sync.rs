//! Mirror Engine - Orchestrates one mirror run
//!
//! A run collects and filters source repositories, prepares destination
//! organizations, resolves a target per repository and then drives each
//! repository through its mirror state machine, strictly one at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::{collect_repositories, FetchOptions, Repository, SourceApi};
use crate::error::{ConfigError, MirrorError, MirrorWarning};
use crate::filter::NameFilter;
use crate::gitea::{DestinationApi, GiteaClient, MigrateRepoRequest, Target};
use crate::github::GitHubClient;
use crate::issues::replicate_issues;
use crate::target::{
    bootstrap_organizations, prepare_organization_targets, source_organizations, Resolution,
    TargetResolver, TargetSettings,
};

/// Destination-observed state of one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Absent,
    MirroredNotStarred,
    MirroredStarred,
}

/// What happened to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOutcome {
    /// Mirror created during this run
    Mirrored {
        starred: bool,
        issues_created: usize,
        issues_failed: usize,
    },
    /// Dry run: the mirror would have been created
    WouldMirror { star: bool },
    /// Existing mirror left untouched
    AlreadyMirrored,
    /// Existing mirror starred during this run
    Starred,
    AlreadyStarred,
    /// Dry run: the existing mirror would have been starred
    WouldStar,
}

/// Per-repository result of a run
#[derive(Debug)]
pub struct RepositoryReport {
    pub repository: String,
    pub target: Target,
    pub outcome: Result<RepositoryOutcome, MirrorError>,
    pub warnings: Vec<MirrorWarning>,
}

/// Results from a complete mirror run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub found: usize,
    pub mirrored: usize,
    pub already_mirrored: usize,
    pub starred: usize,
    pub dry_run_actions: usize,
    pub failed: usize,
    pub warnings: usize,
    pub duration: Duration,
    pub reports: Vec<RepositoryReport>,
}

impl RunSummary {
    fn record(&mut self, report: RepositoryReport) {
        self.warnings += report.warnings.len();

        match &report.outcome {
            Ok(RepositoryOutcome::Mirrored { starred, .. }) => {
                self.mirrored += 1;
                if *starred {
                    self.starred += 1;
                }
            }
            Ok(RepositoryOutcome::WouldMirror { .. } | RepositoryOutcome::WouldStar) => {
                self.dry_run_actions += 1
            }
            Ok(RepositoryOutcome::AlreadyMirrored | RepositoryOutcome::AlreadyStarred) => {
                self.already_mirrored += 1
            }
            Ok(RepositoryOutcome::Starred) => {
                self.already_mirrored += 1;
                self.starred += 1;
            }
            Err(_) => self.failed += 1,
        }

        self.reports.push(report);
    }
}

/// Drives mirror runs against one source and one destination
pub struct MirrorEngine<S, D> {
    config: Arc<Config>,
    source: S,
    destination: D,
}

impl MirrorEngine<GitHubClient, GiteaClient> {
    /// Build an engine talking to GitHub and the configured Gitea instance
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let source = GitHubClient::new(config.github.token.as_deref())
            .context("Failed to create GitHub client")?;
        let destination = GiteaClient::new(&config.gitea.url, &config.gitea.token)
            .context("Failed to create Gitea client")?;

        Ok(Self::new(config, source, destination)?)
    }
}

impl<S, D> MirrorEngine<S, D>
where
    S: SourceApi,
    D: DestinationApi,
{
    /// Create an engine; the configuration is validated before anything else
    pub fn new(config: Config, source: S, destination: D) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            source,
            destination,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Collect and filter the repositories a run would process
    pub async fn discover(&self) -> Result<Vec<Repository>, MirrorError> {
        let options = FetchOptions::from(self.config.as_ref());
        let collected = collect_repositories(&self.source, &options).await?;
        let collected_count = collected.len();

        let filter = NameFilter::new(&self.config.filters.include, &self.config.filters.exclude);
        let retained = filter.apply(collected);

        debug!(
            "Filtered {} repositories to {}",
            collected_count,
            retained.len()
        );
        Ok(retained)
    }

    /// Run a complete mirror pass
    pub async fn run_once(&self) -> Result<RunSummary, MirrorError> {
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        if self.config.dry_run {
            info!("Starting mirror run (dry run)");
        } else {
            info!("Starting mirror run");
        }

        summary.warnings += bootstrap_organizations(&self.destination, &self.config)
            .await
            .len();

        let repositories = self.discover().await?;
        summary.found = repositories.len();
        info!("Found {} repositories to mirror", repositories.len());

        let user = self
            .destination
            .current_user()
            .await
            .map_err(MirrorError::DestinationUser)?;
        debug!("Authenticated to Gitea as {}", user.name);

        let org_targets = if self.config.github.preserve_org_structure {
            let (targets, warnings) = prepare_organization_targets(
                &self.destination,
                &source_organizations(&repositories),
                self.config.gitea.visibility,
                self.config.dry_run,
            )
            .await;
            summary.warnings += warnings.len();
            targets
        } else {
            Default::default()
        };

        let resolver = TargetResolver::new(
            &self.destination,
            TargetSettings::from(self.config.as_ref()),
            user,
            org_targets,
        );

        for repo in &repositories {
            let report = self.mirror_repository(&resolver, repo).await;
            summary.record(report);
        }

        summary.duration = start_time.elapsed();
        info!(
            "Mirroring process completed in {:.2}s: {} mirrored, {} already mirrored, {} starred, {} dry-run actions, {} failed, {} warnings",
            summary.duration.as_secs_f64(),
            summary.mirrored,
            summary.already_mirrored,
            summary.starred,
            summary.dry_run_actions,
            summary.failed,
            summary.warnings
        );

        Ok(summary)
    }

    /// Resolve a target for `repo` and drive it through the state machine
    pub async fn mirror_repository(
        &self,
        resolver: &TargetResolver<'_, D>,
        repo: &Repository,
    ) -> RepositoryReport {
        let Resolution {
            target,
            mut warnings,
            ..
        } = resolver.resolve(repo).await;

        let outcome = self.advance(repo, &target, &mut warnings).await;
        if let Err(e) = &outcome {
            error!("Error mirroring repository {}: {}", repo.name, e);
        }

        RepositoryReport {
            repository: repo.name.clone(),
            target,
            outcome,
            warnings,
        }
    }

    /// Query the destination for the current state of `repo`
    pub async fn observe(&self, repo: &Repository, target: &Target) -> Result<MirrorState, MirrorError> {
        let exists = self
            .destination
            .repository_exists(target, &repo.name)
            .await
            .map_err(|source| MirrorError::ExistenceCheck {
                repo: repo.name.clone(),
                target: target.to_string(),
                source,
            })?;

        if !exists {
            return Ok(MirrorState::Absent);
        }
        if !repo.starred {
            return Ok(MirrorState::MirroredNotStarred);
        }

        match self.destination.is_starred(target, &repo.name).await {
            Ok(true) => Ok(MirrorState::MirroredStarred),
            Ok(false) => Ok(MirrorState::MirroredNotStarred),
            Err(e) => {
                debug!("Could not read star state of {}/{}: {}", target.name, repo.name, e);
                Ok(MirrorState::MirroredNotStarred)
            }
        }
    }

    async fn advance(
        &self,
        repo: &Repository,
        target: &Target,
        warnings: &mut Vec<MirrorWarning>,
    ) -> Result<RepositoryOutcome, MirrorError> {
        match self.observe(repo, target).await? {
            MirrorState::Absent => self.create_mirror(repo, target, warnings).await,
            MirrorState::MirroredStarred => {
                info!(
                    "Repository {} is already mirrored and starred in {}; doing nothing.",
                    repo.name, target
                );
                Ok(RepositoryOutcome::AlreadyStarred)
            }
            MirrorState::MirroredNotStarred if repo.starred => {
                info!(
                    "Repository {} is already mirrored in {}; checking if it needs to be starred.",
                    repo.name, target
                );
                Ok(self.star_existing(repo, target, warnings).await)
            }
            MirrorState::MirroredNotStarred => {
                info!(
                    "Repository {} is already mirrored in {}; doing nothing.",
                    repo.name, target
                );
                Ok(RepositoryOutcome::AlreadyMirrored)
            }
        }
    }

    async fn star_existing(
        &self,
        repo: &Repository,
        target: &Target,
        warnings: &mut Vec<MirrorWarning>,
    ) -> RepositoryOutcome {
        if self.config.dry_run {
            info!(
                "DRY RUN: Would star repository in Gitea: {}/{}",
                target.name, repo.name
            );
            return RepositoryOutcome::WouldStar;
        }

        if self.star(repo, target, warnings).await {
            RepositoryOutcome::Starred
        } else {
            RepositoryOutcome::AlreadyMirrored
        }
    }

    /// Star `repo`, recording a warning on failure
    async fn star(&self, repo: &Repository, target: &Target, warnings: &mut Vec<MirrorWarning>) -> bool {
        match self.destination.star_repository(target, &repo.name).await {
            Ok(()) => {
                info!(
                    "Successfully starred repository in Gitea: {}/{}",
                    target.name, repo.name
                );
                true
            }
            Err(source) => {
                let warning = MirrorWarning::Star {
                    repo: repo.name.clone(),
                    source,
                };
                warn!("{}", warning);
                warnings.push(warning);
                false
            }
        }
    }

    async fn create_mirror(
        &self,
        repo: &Repository,
        target: &Target,
        warnings: &mut Vec<MirrorWarning>,
    ) -> Result<RepositoryOutcome, MirrorError> {
        if self.config.dry_run {
            if repo.starred {
                info!(
                    "DRY RUN: Would mirror and star repository to {}: {} (starred)",
                    target, repo.name
                );
            } else {
                info!("DRY RUN: Would mirror repository to {}: {}", target, repo.name);
            }
            return Ok(RepositoryOutcome::WouldMirror { star: repo.starred });
        }

        info!(
            "Mirroring repository to {}: {}{}",
            target,
            repo.name,
            if repo.starred { " (will be starred)" } else { "" }
        );

        let request = MigrateRepoRequest {
            auth_token: self.forwarded_credential(repo),
            clone_addr: repo.clone_url.clone(),
            mirror: true,
            repo_name: repo.name.clone(),
            uid: target.id,
            private: repo.private,
        };
        self.destination
            .migrate_repository(&request)
            .await
            .map_err(|source| MirrorError::MirrorCreate {
                repo: repo.name.clone(),
                source,
            })?;
        info!("Successfully mirrored: {}", repo.name);

        let starred = repo.starred && self.star(repo, target, warnings).await;

        let (issues_created, issues_failed) = if self.should_mirror_issues(repo) {
            let report = replicate_issues(
                &self.source,
                &self.destination,
                repo,
                target,
                self.config.dry_run,
            )
            .await;
            warnings.extend(report.warnings);
            (report.created, report.failed)
        } else {
            if self.config.github.mirror_issues && repo.starred {
                info!("Skipping issues for starred repository: {}", repo.name);
            }
            (0, 0)
        };

        Ok(RepositoryOutcome::Mirrored {
            starred,
            issues_created,
            issues_failed,
        })
    }

    fn should_mirror_issues(&self, repo: &Repository) -> bool {
        let github = &self.config.github;
        github.mirror_issues && !(repo.starred && github.skip_starred_issues)
    }

    /// Source credential sent with a migrate request, if any
    fn forwarded_credential(&self, repo: &Repository) -> Option<String> {
        if repo.private || self.config.source_credential_required() {
            self.config.github.token.clone()
        } else {
            None
        }
    }
}

//! Destination target resolution
//!
//! Every repository lands in exactly one [`Target`]. The choice is an ordered
//! rule list evaluated top-down; the first rule that resolves wins, and a rule
//! that applies but cannot resolve falls through to the default target with a
//! warning.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{Config, Visibility};
use crate::discovery::Repository;
use crate::error::MirrorWarning;
use crate::gitea::{CreateOrganizationRequest, DestinationApi, GiteaError, Target};

/// Resolution rules in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    /// Starred repositories go to the starred-repos organization
    StarredOrganization,
    /// Organization repositories go to their pre-resolved like-named organization
    SourceOrganization,
    /// Configured organization, else the authenticated user
    Default,
}

pub const RULES: [TargetRule; 3] = [
    TargetRule::StarredOrganization,
    TargetRule::SourceOrganization,
    TargetRule::Default,
];

/// Result of evaluating one rule against one repository
#[derive(Debug)]
pub enum RuleOutcome {
    Resolved(Target),
    NotApplicable,
    FallbackToDefault(MirrorWarning),
}

/// Chosen target together with the rule that produced it
#[derive(Debug)]
pub struct Resolution {
    pub target: Target,
    pub rule: TargetRule,
    pub warnings: Vec<MirrorWarning>,
}

/// Settings the resolver reads from the run configuration
#[derive(Debug, Clone, Default)]
pub struct TargetSettings {
    pub default_organization: Option<String>,
    pub starred_organization: Option<String>,
    pub preserve_org_structure: bool,
}

impl From<&Config> for TargetSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_organization: config.gitea.organization.clone(),
            starred_organization: config.gitea.starred_repos_org.clone(),
            preserve_org_structure: config.github.preserve_org_structure,
        }
    }
}

/// Maps repositories to destination targets for one run
pub struct TargetResolver<'a, D: DestinationApi + ?Sized> {
    destination: &'a D,
    settings: TargetSettings,
    user: Target,
    org_targets: HashMap<String, Target>,
}

impl<'a, D: DestinationApi + ?Sized> TargetResolver<'a, D> {
    pub fn new(
        destination: &'a D,
        settings: TargetSettings,
        user: Target,
        org_targets: HashMap<String, Target>,
    ) -> Self {
        Self {
            destination,
            settings,
            user,
            org_targets,
        }
    }

    /// Pre-resolved organization targets
    pub fn organization_targets(&self) -> &HashMap<String, Target> {
        &self.org_targets
    }

    /// Pick the target for `repo`
    pub async fn resolve(&self, repo: &Repository) -> Resolution {
        let mut warnings = Vec::new();

        for rule in RULES {
            match self.apply(rule, repo, &mut warnings).await {
                RuleOutcome::Resolved(target) => {
                    debug!("Resolved {} to {} via {:?}", repo.name, target, rule);
                    return Resolution {
                        target,
                        rule,
                        warnings,
                    };
                }
                RuleOutcome::NotApplicable => continue,
                RuleOutcome::FallbackToDefault(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                    break;
                }
            }
        }

        let target = self.default_target(&mut warnings).await;
        Resolution {
            target,
            rule: TargetRule::Default,
            warnings,
        }
    }

    /// Evaluate a single rule
    pub async fn apply(
        &self,
        rule: TargetRule,
        repo: &Repository,
        warnings: &mut Vec<MirrorWarning>,
    ) -> RuleOutcome {
        match rule {
            TargetRule::StarredOrganization => {
                let org = match (&self.settings.starred_organization, repo.starred) {
                    (Some(org), true) => org,
                    _ => return RuleOutcome::NotApplicable,
                };

                match self.destination.get_organization(org).await {
                    Ok(target) => {
                        info!(
                            "Using organization \"{}\" for starred repository: {}",
                            org, repo.name
                        );
                        RuleOutcome::Resolved(target)
                    }
                    Err(e) => RuleOutcome::FallbackToDefault(MirrorWarning::TargetResolution {
                        org: org.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
            TargetRule::SourceOrganization => {
                let org = match (&repo.organization, self.settings.preserve_org_structure) {
                    (Some(org), true) => org,
                    _ => return RuleOutcome::NotApplicable,
                };

                match self.org_targets.get(org) {
                    Some(target) => RuleOutcome::Resolved(target.clone()),
                    None => RuleOutcome::FallbackToDefault(MirrorWarning::TargetResolution {
                        org: org.clone(),
                        reason: "no destination organization was prepared".to_string(),
                    }),
                }
            }
            TargetRule::Default => RuleOutcome::Resolved(self.default_target(warnings).await),
        }
    }

    async fn default_target(&self, warnings: &mut Vec<MirrorWarning>) -> Target {
        let Some(org) = &self.settings.default_organization else {
            return self.user.clone();
        };

        match self.destination.get_organization(org).await {
            Ok(target) => target,
            Err(e) => {
                let warning = MirrorWarning::TargetResolution {
                    org: org.clone(),
                    reason: format!("{}, using user {} instead", e, self.user.name),
                };
                warn!("{}", warning);
                warnings.push(warning);
                self.user.clone()
            }
        }
    }
}

/// Create `name` at the destination unless this is a dry run
pub async fn ensure_organization<D: DestinationApi + ?Sized>(
    destination: &D,
    name: &str,
    visibility: Visibility,
    dry_run: bool,
) -> Result<(), GiteaError> {
    if dry_run {
        info!(
            "DRY RUN: Would create Gitea organization: {} ({})",
            name, visibility
        );
        return Ok(());
    }

    destination
        .create_organization(&CreateOrganizationRequest {
            username: name.to_string(),
            visibility,
        })
        .await
}

/// Ensure the configured default and starred-repos organizations exist
pub async fn bootstrap_organizations<D: DestinationApi + ?Sized>(
    destination: &D,
    config: &Config,
) -> Vec<MirrorWarning> {
    let mut wanted = Vec::new();
    if let Some(org) = &config.gitea.organization {
        wanted.push(org.as_str());
    }
    if config.github.mirror_starred {
        if let Some(org) = &config.gitea.starred_repos_org {
            if !wanted.contains(&org.as_str()) {
                wanted.push(org.as_str());
            }
        }
    }

    let mut warnings = Vec::new();
    for org in wanted {
        if let Err(source) =
            ensure_organization(destination, org, config.gitea.visibility, config.dry_run).await
        {
            let warning = MirrorWarning::OrganizationSetup {
                org: org.to_string(),
                source,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
    }
    warnings
}

/// Unique source organizations of `repositories`, first-seen order
pub fn source_organizations(repositories: &[Repository]) -> Vec<String> {
    let mut orgs: Vec<String> = Vec::new();
    for org in repositories.iter().filter_map(|r| r.organization.as_deref()) {
        if !org.is_empty() && !orgs.iter().any(|o| o == org) {
            orgs.push(org.to_string());
        }
    }
    orgs
}

/// Ensure and look up one destination organization per source organization
///
/// Organizations that cannot be prepared are left out of the map.
pub async fn prepare_organization_targets<D: DestinationApi + ?Sized>(
    destination: &D,
    organizations: &[String],
    visibility: Visibility,
    dry_run: bool,
) -> (HashMap<String, Target>, Vec<MirrorWarning>) {
    let mut targets = HashMap::new();
    let mut warnings = Vec::new();

    for org in organizations {
        info!(
            "Preparing Gitea organization for GitHub organization: {}",
            org
        );

        let prepared = match ensure_organization(destination, org, visibility, dry_run).await {
            Ok(()) => destination.get_organization(org).await,
            Err(e) => Err(e),
        };

        match prepared {
            Ok(target) => {
                targets.insert(org.clone(), target);
            }
            Err(source) => {
                let warning = MirrorWarning::OrganizationSetup {
                    org: org.clone(),
                    source,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
    }

    (targets, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str, organization: Option<&str>) -> Repository {
        Repository {
            name: name.to_string(),
            clone_url: format!("https://github.com/octo/{}.git", name),
            private: false,
            is_fork: false,
            owner: "octo".to_string(),
            full_name: format!("octo/{}", name),
            has_issues: false,
            organization: organization.map(str::to_string),
            starred: false,
        }
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(RULES[0], TargetRule::StarredOrganization);
        assert_eq!(RULES[RULES.len() - 1], TargetRule::Default);
    }

    #[test]
    fn test_source_organizations_first_seen_unique() {
        let repos = vec![
            repo("a", Some("beta")),
            repo("b", None),
            repo("c", Some("alpha")),
            repo("d", Some("beta")),
            repo("e", Some("")),
        ];
        assert_eq!(
            source_organizations(&repos),
            vec!["beta".to_string(), "alpha".to_string()]
        );
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.gitea.organization = Some("mirrors".to_string());
        config.github.preserve_org_structure = true;

        let settings = TargetSettings::from(&config);
        assert_eq!(settings.default_organization.as_deref(), Some("mirrors"));
        assert_eq!(settings.starred_organization.as_deref(), Some("github"));
        assert!(settings.preserve_org_structure);
    }
}

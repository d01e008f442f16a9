//! Issue replication for a freshly created mirror
//!
//! Best-effort and sequential: issues are recreated one at a time in source
//! order, and neither a failed issue nor a failed label stops the rest.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::discovery::{Repository, SourceApi, SourceIssue};
use crate::error::MirrorWarning;
use crate::gitea::{
    CreateIssueRequest, CreateLabelRequest, DestinationApi, IssueLabelsRequest, Target,
};

/// Counts and warnings from one replication pass
#[derive(Debug, Default)]
pub struct IssueReport {
    pub created: usize,
    pub failed: usize,
    pub warnings: Vec<MirrorWarning>,
}

/// Body of the destination issue: provenance line, blank line, original body
pub fn provenance_body(author: &str, created_at: DateTime<Utc>, body: &str) -> String {
    format!(
        "*Originally created by @{} on {}*\n\n{}",
        author,
        created_at.format("%Y-%m-%d"),
        body
    )
}

/// Random label color as six lowercase hex digits
pub fn random_label_color() -> String {
    format!("{:06x}", rand::thread_rng().gen_range(0..0xFF_FFFFu32))
}

impl From<&SourceIssue> for CreateIssueRequest {
    fn from(issue: &SourceIssue) -> Self {
        Self {
            title: issue.title.clone(),
            body: provenance_body(&issue.author, issue.created_at, &issue.body),
            closed: issue.closed,
        }
    }
}

/// Recreate every source issue of `repo` under `target`
pub async fn replicate_issues<S, D>(
    source: &S,
    destination: &D,
    repo: &Repository,
    target: &Target,
    dry_run: bool,
) -> IssueReport
where
    S: SourceApi + ?Sized,
    D: DestinationApi + ?Sized,
{
    let mut report = IssueReport::default();

    if !repo.has_issues {
        info!(
            "Repository {} doesn't have issues enabled. Skipping issues mirroring.",
            repo.name
        );
        return report;
    }

    if dry_run {
        info!("DRY RUN: Would mirror issues for repository: {}", repo.name);
        return report;
    }

    let issues = match source.list_issues(&repo.owner, &repo.name).await {
        Ok(issues) => issues,
        Err(source) => {
            let warning = MirrorWarning::IssueFetch {
                repo: repo.full_name.clone(),
                source,
            };
            warn!("{}", warning);
            report.warnings.push(warning);
            return report;
        }
    };

    info!("Found {} issues for {}", issues.len(), repo.name);

    for issue in &issues {
        let number = match destination
            .create_issue(target, &repo.name, &CreateIssueRequest::from(issue))
            .await
        {
            Ok(number) => number,
            Err(source) => {
                let warning = MirrorWarning::IssueCreate {
                    repo: repo.name.clone(),
                    title: issue.title.clone(),
                    source,
                };
                warn!("{}", warning);
                report.warnings.push(warning);
                report.failed += 1;
                continue;
            }
        };

        info!("Created issue #{}: {}", number, issue.title);
        report.created += 1;

        for label in &issue.labels {
            if let Some(warning) = copy_label(destination, repo, target, number, label).await {
                warn!("{}", warning);
                report.warnings.push(warning);
            }
        }
    }

    info!(
        "Completed mirroring issues for {} ({} created, {} failed)",
        repo.name, report.created, report.failed
    );
    report
}

/// Create `label` in the repository, then attach it to issue `number`
async fn copy_label<D: DestinationApi + ?Sized>(
    destination: &D,
    repo: &Repository,
    target: &Target,
    number: u64,
    label: &str,
) -> Option<MirrorWarning> {
    let request = CreateLabelRequest {
        name: label.to_string(),
        color: random_label_color(),
    };
    if let Err(e) = destination.create_label(target, &repo.name, &request).await {
        // usually the label already exists
        debug!("Could not create label {} in {}: {}", label, repo.name, e);
    }

    let attach = IssueLabelsRequest {
        labels: vec![label.to_string()],
    };
    destination
        .add_issue_labels(target, &repo.name, number, &attach)
        .await
        .err()
        .map(|source| MirrorWarning::Label {
            repo: repo.name.clone(),
            issue: number,
            label: label.to_string(),
            source,
        })
}

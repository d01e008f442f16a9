//! Include/exclude name filtering
//!
//! A repository survives when its name matches at least one include pattern
//! and no exclude pattern. Patterns are globs; a pattern that fails to parse
//! simply matches nothing.

use glob::Pattern;
use tracing::debug;

use crate::discovery::Repository;

/// Compiled include/exclude pattern sets
#[derive(Debug, Clone)]
pub struct NameFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl NameFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: compile(include),
            exclude: compile(exclude),
        }
    }

    /// Whether a repository name passes both pattern sets
    pub fn accepts(&self, name: &str) -> bool {
        let included = self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }

    /// Retain the repositories whose names pass, preserving order
    pub fn apply(&self, repositories: Vec<Repository>) -> Vec<Repository> {
        repositories
            .into_iter()
            .filter(|repo| {
                let keep = self.accepts(&repo.name);
                if !keep {
                    debug!("Filtered out repository: {}", repo.name);
                }
                keep
            })
            .collect()
    }
}

/// Collapse a `**` that shares a path segment with other text into `*`.
/// `glob` only accepts `**` as a whole segment.
fn normalize(raw: &str) -> String {
    raw.split('/')
        .map(|segment| {
            if segment == "**" || !segment.contains("**") {
                return segment.to_string();
            }
            let mut collapsed = String::with_capacity(segment.len());
            for c in segment.chars() {
                if !(c == '*' && collapsed.ends_with('*')) {
                    collapsed.push(c);
                }
            }
            collapsed
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn compile(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(&normalize(raw)) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                debug!("Ignoring malformed pattern '{}': {}", raw, e);
                None
            }
        })
        .collect()
}

/// Convenience wrapper for a one-off filter pass
pub fn filter_repositories(
    repositories: Vec<Repository>,
    include: &[String],
    exclude: &[String],
) -> Vec<Repository> {
    NameFilter::new(include, exclude).apply(repositories)
}

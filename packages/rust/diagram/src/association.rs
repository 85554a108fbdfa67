//! Repository → pipeline association.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use projectmap_shared::{PipelineDefinition, Repository};

/// One repository with the pipelines built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub repository: String,
    /// Pipeline names in discovery order.
    pub pipelines: Vec<String>,
}

/// Ordered association map: one entry per repository, in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Associations {
    entries: Vec<Association>,
}

impl Associations {
    /// Entries in repository fetch order.
    pub fn entries(&self) -> &[Association] {
        &self.entries
    }

    /// Pipelines associated with `repository`, if it is known.
    pub fn pipelines_for(&self, repository: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|a| a.repository == repository)
            .map(|a| a.pipelines.as_slice())
    }

    /// Total number of associated pipelines across all repositories.
    pub fn pipeline_count(&self) -> usize {
        self.entries.iter().map(|a| a.pipelines.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join repositories against pipeline definitions by exact repository name.
///
/// Every repository gets an entry, possibly empty. Definitions that are not
/// enabled, or whose repository name matches nothing, are dropped.
pub fn resolve_associations(
    repositories: &[Repository],
    pipelines: &[PipelineDefinition],
) -> Associations {
    let known: HashSet<&str> = repositories.iter().map(|r| r.name.as_str()).collect();
    let mut by_repository: HashMap<&str, Vec<String>> = HashMap::new();
    let mut unmatched = 0usize;

    for pipeline in pipelines.iter().filter(|p| p.queue_status.is_enabled()) {
        let Some(repository) = pipeline.repository_name.as_deref() else {
            unmatched += 1;
            continue;
        };
        if known.contains(repository) {
            by_repository
                .entry(repository)
                .or_default()
                .push(pipeline.name.clone());
        } else {
            debug!(pipeline = %pipeline.name, repository, "pipeline repository not listed, dropping");
            unmatched += 1;
        }
    }

    let entries = repositories
        .iter()
        .map(|r| Association {
            repository: r.name.clone(),
            pipelines: by_repository.get(r.name.as_str()).cloned().unwrap_or_default(),
        })
        .collect();

    if unmatched > 0 {
        debug!(unmatched, "pipelines without a matching repository");
    }

    Associations { entries }
}

//! Core domain types for projectmap runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one invocation (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Projects and repositories
// ---------------------------------------------------------------------------

/// A project as returned by the project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Platform identifier (GUID string).
    #[serde(default)]
    pub id: String,
    /// Display name; also the URL path segment for project-scoped calls.
    pub name: String,
}

impl ProjectRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A source repository inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

impl Repository {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline definitions
// ---------------------------------------------------------------------------

/// Queue status of a build definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueStatus {
    Enabled,
    Paused,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl QueueStatus {
    /// Only enabled definitions take part in the diagram.
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// A build pipeline definition bound to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: u64,
    pub name: String,
    pub queue_status: QueueStatus,
    /// Owning repository name. `None` until the detail lookup has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
}

impl PipelineDefinition {
    /// Convenience constructor for an enabled definition bound to `repository`.
    pub fn enabled(id: u64, name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            queue_status: QueueStatus::Enabled,
            repository_name: Some(repository.into()),
        }
    }

    /// Same as [`PipelineDefinition::enabled`] but with an explicit status.
    pub fn with_status(mut self, status: QueueStatus) -> Self {
        self.queue_status = status;
        self
    }
}

/// Everything the diagram needs to know about one project.
#[derive(Debug, Clone)]
pub struct ProjectInventory {
    pub project: ProjectRef,
    /// Repositories in fetch order.
    pub repositories: Vec<Repository>,
    /// Enabled definitions in discovery order, each with a repository name.
    pub pipelines: Vec<PipelineDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_parses_platform_values() {
        let s: QueueStatus = serde_json::from_str("\"enabled\"").expect("enabled");
        assert_eq!(s, QueueStatus::Enabled);
        let s: QueueStatus = serde_json::from_str("\"disabled\"").expect("disabled");
        assert_eq!(s, QueueStatus::Disabled);
        let s: QueueStatus = serde_json::from_str("\"somethingNew\"").expect("unknown");
        assert_eq!(s, QueueStatus::Unknown);
        assert!(!QueueStatus::Paused.is_enabled());
    }

    #[test]
    fn project_ref_ignores_extra_fields() {
        let json = r#"{"id":"0f1c","name":"Billing","state":"wellFormed","visibility":"private"}"#;
        let project: ProjectRef = serde_json::from_str(json).expect("deserialize");
        assert_eq!(project, ProjectRef::new("0f1c", "Billing"));
    }

    #[test]
    fn run_ids_are_unique_v7() {
        let first = RunId::new();
        let second = RunId::new();
        assert_eq!(first.0.get_version_num(), 7);
        assert_ne!(first, second);
    }

    #[test]
    fn run_id_survives_being_stored() {
        let id = RunId::new();
        let stored = vec![id];
        assert_eq!(stored[0], id);
        assert_eq!(id.to_string(), stored[0].0.to_string());
    }
}

//! Actuation tasks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceId;

/// Handle to in-flight external work returned by a resource handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    /// External execution id
    pub id: String,
    /// Display name
    pub name: String,
}

impl Task {
    /// Create a task handle
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Still running
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with a failure
    Failed,
    /// Cancelled out of band
    Cancelled,
}

impl TaskStatus {
    /// No longer running
    #[inline]
    #[must_use]
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A launched task tracked against the resource and version that started it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// External execution id
    pub id: String,
    /// Display name
    pub name: String,
    /// Resource that launched it
    pub resource_id: ResourceId,
    /// Owning application
    pub application: String,
    /// Environment of the resource
    pub environment_name: String,
    /// Artifact version being deployed, if any
    pub artifact_version: Option<String>,
    /// Launch time
    pub started_at: DateTime<Utc>,
    /// Last known status
    pub status: TaskStatus,
}

//! Events published at the observability boundary
//!
//! Resource-scoped events double as the per-resource audit trail: every
//! resource event except [`DeliveryEvent::ResourceCheckSkipped`] is appended
//! to resource history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;
use crate::model::{ArtifactType, Resource, ResourceId, ResourceKind, Task};

/// Identifies the resource an event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// Resource id
    pub id: ResourceId,
    /// Resource kind
    pub kind: ResourceKind,
    /// Owning application
    pub application: String,
}

impl From<&Resource> for ResourceRef {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id.clone(),
            kind: resource.kind.clone(),
            application: resource.application.clone(),
        }
    }
}

/// Everything the engine reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DeliveryEvent {
    /// Resource does not exist yet
    ResourceMissing {
        resource: ResourceRef,
        at: DateTime<Utc>,
    },
    /// Current state matches desired state
    ResourceValid {
        resource: ResourceRef,
        at: DateTime<Utc>,
    },
    /// Current state drifted from desired state
    ResourceDeltaDetected {
        resource: ResourceRef,
        delta: serde_json::Value,
        at: DateTime<Utc>,
    },
    /// A previously detected delta is gone
    ResourceDeltaResolved {
        resource: ResourceRef,
        at: DateTime<Utc>,
    },
    /// Handler launched external work
    ResourceActuationLaunched {
        resource: ResourceRef,
        plugin: String,
        tasks: Vec<Task>,
        at: DateTime<Utc>,
    },
    /// A veto blocked actuation
    ResourceActuationVetoed {
        resource: ResourceRef,
        reason: Option<String>,
        veto_name: String,
        suggested_status: Option<String>,
        at: DateTime<Utc>,
    },
    /// Actuation paused
    ResourceActuationPaused {
        resource: ResourceRef,
        by: Option<String>,
        at: DateTime<Utc>,
    },
    /// Actuation resumed
    ResourceActuationResumed {
        resource: ResourceRef,
        by: Option<String>,
        at: DateTime<Utc>,
    },
    /// Check stopped early for a named reason
    ResourceCheckSkipped {
        resource: ResourceRef,
        reason: String,
        at: DateTime<Utc>,
    },
    /// Check failed
    ResourceCheckError {
        resource: ResourceRef,
        error_type: String,
        error_class: ErrorClass,
        message: String,
        at: DateTime<Utc>,
    },
    /// A dependency is not resolvable yet
    ResourceCheckUnresolvable {
        resource: ResourceRef,
        message: String,
        at: DateTime<Utc>,
    },
    /// Handler declined to act on the diff
    ResourceDiffNotActionable {
        resource: ResourceRef,
        message: Option<String>,
        at: DateTime<Utc>,
    },
    /// A launched task finished successfully
    ResourceTaskSucceeded {
        resource: ResourceRef,
        task_id: String,
        at: DateTime<Utc>,
    },
    /// A launched task failed
    ResourceTaskFailed {
        resource: ResourceRef,
        task_id: String,
        message: Option<String>,
        at: DateTime<Utc>,
    },
    /// A version was approved for an environment
    ArtifactVersionApproved {
        application: String,
        delivery_config_name: String,
        environment_name: String,
        artifact_name: String,
        artifact_type: ArtifactType,
        version: String,
        at: DateTime<Utc>,
    },
    /// A version was vetoed in an environment
    ArtifactVersionVetoed {
        application: String,
        delivery_config_name: String,
        environment_name: String,
        artifact_reference: String,
        version: String,
        vetoed_by: String,
        at: DateTime<Utc>,
    },
}

impl DeliveryEvent {
    /// Resource the event is about
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceRef> {
        match self {
            Self::ResourceMissing { resource, .. }
            | Self::ResourceValid { resource, .. }
            | Self::ResourceDeltaDetected { resource, .. }
            | Self::ResourceDeltaResolved { resource, .. }
            | Self::ResourceActuationLaunched { resource, .. }
            | Self::ResourceActuationVetoed { resource, .. }
            | Self::ResourceActuationPaused { resource, .. }
            | Self::ResourceActuationResumed { resource, .. }
            | Self::ResourceCheckSkipped { resource, .. }
            | Self::ResourceCheckError { resource, .. }
            | Self::ResourceCheckUnresolvable { resource, .. }
            | Self::ResourceDiffNotActionable { resource, .. }
            | Self::ResourceTaskSucceeded { resource, .. }
            | Self::ResourceTaskFailed { resource, .. } => Some(resource),
            Self::ArtifactVersionApproved { .. } | Self::ArtifactVersionVetoed { .. } => None,
        }
    }

    /// Id of the resource the event is about
    #[inline]
    #[must_use]
    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource().map(|r| &r.id)
    }

    /// Event type name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceMissing { .. } => "ResourceMissing",
            Self::ResourceValid { .. } => "ResourceValid",
            Self::ResourceDeltaDetected { .. } => "ResourceDeltaDetected",
            Self::ResourceDeltaResolved { .. } => "ResourceDeltaResolved",
            Self::ResourceActuationLaunched { .. } => "ResourceActuationLaunched",
            Self::ResourceActuationVetoed { .. } => "ResourceActuationVetoed",
            Self::ResourceActuationPaused { .. } => "ResourceActuationPaused",
            Self::ResourceActuationResumed { .. } => "ResourceActuationResumed",
            Self::ResourceCheckSkipped { .. } => "ResourceCheckSkipped",
            Self::ResourceCheckError { .. } => "ResourceCheckError",
            Self::ResourceCheckUnresolvable { .. } => "ResourceCheckUnresolvable",
            Self::ResourceDiffNotActionable { .. } => "ResourceDiffNotActionable",
            Self::ResourceTaskSucceeded { .. } => "ResourceTaskSucceeded",
            Self::ResourceTaskFailed { .. } => "ResourceTaskFailed",
            Self::ArtifactVersionApproved { .. } => "ArtifactVersionApproved",
            Self::ArtifactVersionVetoed { .. } => "ArtifactVersionVetoed",
        }
    }

    /// Recorded in resource history
    #[must_use]
    pub fn is_history_event(&self) -> bool {
        self.resource().is_some() && !matches!(self, Self::ResourceCheckSkipped { .. })
    }

    /// Consecutive duplicates collapse into one history entry
    #[inline]
    #[must_use]
    pub fn ignore_repeated_in_history(&self) -> bool {
        matches!(self, Self::ResourceValid { .. })
    }
}

/// Sink for published events
pub trait EventPublisher: Send + Sync {
    /// Publish one event
    fn publish(&self, event: DeliveryEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resource_ref() -> ResourceRef {
        ResourceRef {
            id: ResourceId::new("ec2:cluster:test:fnord"),
            kind: ResourceKind::new("ec2", "cluster", "1"),
            application: "fnord".into(),
        }
    }

    #[test]
    fn skipped_checks_are_not_history() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let skipped = DeliveryEvent::ResourceCheckSkipped {
            resource: resource_ref(),
            reason: "ActuationPaused".into(),
            at,
        };
        let valid = DeliveryEvent::ResourceValid {
            resource: resource_ref(),
            at,
        };
        assert!(!skipped.is_history_event());
        assert!(valid.is_history_event());
        assert!(valid.ignore_repeated_in_history());
        assert_eq!(skipped.resource_id().map(ResourceId::as_str), Some("ec2:cluster:test:fnord"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = DeliveryEvent::ArtifactVersionApproved {
            application: "fnord".into(),
            delivery_config_name: "fnord-manifest".into(),
            environment_name: "test".into(),
            artifact_name: "fnord".into(),
            artifact_type: ArtifactType::Docker,
            version: "1.0".into(),
            at,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ArtifactVersionApproved");
        assert_eq!(json["environmentName"], "test");
        assert!(!event.is_history_event());
        assert_eq!(event.name(), "ArtifactVersionApproved");
    }
}

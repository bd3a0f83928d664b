//! Repository contracts
//!
//! The repository is the single source of truth. Implementations must give
//! point-in-time consistent reads and atomic single-row writes; the engine
//! never assumes a transaction spans two calls, and never caches anything
//! read through these traits across checks.
//!
//! Every method that identifies an artifact does so by delivery config,
//! artifact type and reference together, so artifacts of different types
//! in one config never see each other's versions.

use chrono::{DateTime, Duration, Utc};

use crate::diff::ResourceDiff;
use crate::error::RepositoryError;
use crate::events::DeliveryEvent;
use crate::model::{
    ConstraintState, DeliveryArtifact, DeliveryConfig, EnvironmentArtifactPin,
    EnvironmentArtifactVeto, EnvironmentArtifactVetoes, PinnedEnvironment, PromotionStatus,
    Resource, ResourceId, TaskRecord, TaskStatus,
};

/// Result alias for repository calls
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Delivery configs, constraint state and the approval queue
#[async_trait::async_trait]
pub trait DeliveryConfigRepository: Send + Sync {
    /// Config by name
    async fn get(&self, name: &str) -> RepositoryResult<DeliveryConfig>;

    /// Every config
    async fn all(&self) -> RepositoryResult<Vec<DeliveryConfig>>;

    /// Create or replace a config and upsert its resources
    async fn store(&self, config: DeliveryConfig) -> RepositoryResult<()>;

    /// Config owning a resource
    async fn delivery_config_for_resource(&self, id: &ResourceId)
        -> RepositoryResult<DeliveryConfig>;

    /// Config of an application
    async fn delivery_config_for_application(&self, application: &str)
        -> RepositoryResult<DeliveryConfig>;

    /// Up to `limit` configs not checked within `min_age`; returned configs are stamped as checked
    async fn delivery_configs_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> RepositoryResult<Vec<DeliveryConfig>>;

    /// When the config's promotion check last ran; `None` if never
    async fn delivery_config_last_checked(&self, name: &str)
        -> RepositoryResult<Option<DateTime<Utc>>>;

    /// Make the application's config due on the next tick
    async fn trigger_recheck(&self, application: &str) -> RepositoryResult<()>;

    /// Remove an environment from a config
    async fn delete_environment(&self, config_name: &str, environment: &str)
        -> RepositoryResult<()>;

    /// Persisted state of one constraint for one version
    async fn get_constraint_state(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
        constraint_type: &str,
    ) -> RepositoryResult<Option<ConstraintState>>;

    /// Every persisted state in an environment
    async fn constraint_state_for(
        &self,
        config_name: &str,
        environment: &str,
    ) -> RepositoryResult<Vec<ConstraintState>>;

    /// Create or replace a constraint state
    async fn store_constraint_state(&self, state: ConstraintState) -> RepositoryResult<()>;

    /// Versions with a `PENDING` constraint state
    async fn pending_constraint_versions_for(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
    ) -> RepositoryResult<Vec<String>>;

    /// Queue a version whose constraints all passed
    async fn queue_all_constraints_approved(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
    ) -> RepositoryResult<()>;

    /// Queued versions
    async fn get_queued_constraint_approvals(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
    ) -> RepositoryResult<Vec<String>>;

    /// Drop a queued version
    async fn delete_queued_constraint_approval(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
    ) -> RepositoryResult<()>;
}

/// Artifact versions, approvals, deployments, pins and vetoes
#[async_trait::async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Record a discovered version; true if it was new
    async fn store_version(&self, artifact: &DeliveryArtifact, version: &str)
        -> RepositoryResult<bool>;

    /// Up to `limit` known versions, newest first
    async fn artifact_versions(
        &self,
        artifact: &DeliveryArtifact,
        limit: usize,
    ) -> RepositoryResult<Vec<String>>;

    /// Approve a version; true iff it was not already approved
    async fn approve_version_for(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool>;

    /// Version has been approved
    async fn is_approved_for(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool>;

    /// Highest approved version that is not vetoed
    async fn latest_version_approved_in(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
    ) -> RepositoryResult<Option<String>>;

    /// Rollout of a version started
    async fn mark_as_deploying_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()>;

    /// Rollout of a version finished; it becomes current
    async fn mark_as_successfully_deployed_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()>;

    /// Version was ever deployed successfully
    async fn was_successfully_deployed_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool>;

    /// Version currently deployed
    async fn current_version_deployed_in(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
    ) -> RepositoryResult<Option<String>>;

    /// Where a version stands
    async fn promotion_status(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<PromotionStatus>;

    /// Every pin in a config
    async fn pinned_environments(&self, config: &DeliveryConfig)
        -> RepositoryResult<Vec<PinnedEnvironment>>;

    /// Pin an environment, replacing any existing pin for the artifact
    async fn pin_environment(
        &self,
        config: &DeliveryConfig,
        pin: &EnvironmentArtifactPin,
    ) -> RepositoryResult<()>;

    /// Remove a pin
    async fn delete_pin(
        &self,
        config: &DeliveryConfig,
        environment: &str,
        reference: &str,
    ) -> RepositoryResult<()>;

    /// Every veto in a config, grouped by environment and artifact
    async fn vetoed_environment_versions(
        &self,
        config: &DeliveryConfig,
    ) -> RepositoryResult<Vec<EnvironmentArtifactVetoes>>;

    /// Veto a version; false when refused
    ///
    /// A pinned version is never vetoed. A version that became the rollback
    /// target of an earlier veto is only vetoed with `force`. A successful
    /// veto makes the previously deployed version the rollback target.
    async fn mark_as_vetoed_in(
        &self,
        config: &DeliveryConfig,
        veto: &EnvironmentArtifactVeto,
        force: bool,
    ) -> RepositoryResult<bool>;

    /// Lift a veto
    async fn delete_veto(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()>;
}

/// Resources, check scheduling and resource history
#[async_trait::async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Resource by id
    async fn get(&self, id: &ResourceId) -> RepositoryResult<Resource>;

    /// Create or replace
    async fn store(&self, resource: Resource) -> RepositoryResult<()>;

    /// Remove a resource and its history
    async fn delete(&self, id: &ResourceId) -> RepositoryResult<()>;

    /// Up to `limit` resources not checked within `min_age`; returned resources are stamped
    async fn resources_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> RepositoryResult<Vec<Resource>>;

    /// Make an environment's resources due on the next tick
    async fn trigger_resource_recheck(&self, environment: &str, application: &str)
        -> RepositoryResult<()>;

    /// Append to resource history; a `ResourceValid` following another is dropped
    async fn append_history(&self, event: &DeliveryEvent) -> RepositoryResult<()>;

    /// Most recent history event
    async fn last_event(&self, id: &ResourceId) -> RepositoryResult<Option<DeliveryEvent>>;

    /// Up to `limit` history events, newest first
    async fn event_history(&self, id: &ResourceId, limit: usize)
        -> RepositoryResult<Vec<DeliveryEvent>>;
}

/// Counts consecutive sightings of the same diff
#[async_trait::async_trait]
pub trait DiffFingerprintRepository: Send + Sync {
    /// Record a diff; same fingerprint increments, a different one resets to 1
    async fn store(&self, id: &ResourceId, diff: &ResourceDiff) -> RepositoryResult<()>;

    /// Sightings of the current diff
    async fn diff_count(&self, id: &ResourceId) -> RepositoryResult<u32>;

    /// Actions taken against the current diff
    async fn action_taken_count(&self, id: &ResourceId) -> RepositoryResult<u32>;

    /// Count an action against the current diff
    async fn mark_action_taken(&self, id: &ResourceId) -> RepositoryResult<()>;

    /// Forget the diff
    async fn clear(&self, id: &ResourceId) -> RepositoryResult<()>;
}

/// Actuation pause flags
#[async_trait::async_trait]
pub trait PausedRepository: Send + Sync {
    /// Pause every resource of an application
    async fn pause_application(&self, application: &str) -> RepositoryResult<()>;

    /// Resume an application
    async fn resume_application(&self, application: &str) -> RepositoryResult<()>;

    /// Pause one resource
    async fn pause_resource(&self, id: &ResourceId) -> RepositoryResult<()>;

    /// Resume one resource
    async fn resume_resource(&self, id: &ResourceId) -> RepositoryResult<()>;

    /// Application is paused
    async fn application_paused(&self, application: &str) -> RepositoryResult<bool>;

    /// Resource is paused
    async fn resource_paused(&self, id: &ResourceId) -> RepositoryResult<bool>;
}

/// Leases for scheduled agents
#[async_trait::async_trait]
pub trait AgentLockRepository: Send + Sync {
    /// Take the lease if free or expired; true on success
    async fn try_acquire_lock(&self, agent_name: &str, lock_timeout_seconds: u64)
        -> RepositoryResult<bool>;
}

/// Launched tasks
#[async_trait::async_trait]
pub trait TaskTrackingRepository: Send + Sync {
    /// Track a task
    async fn store(&self, record: TaskRecord) -> RepositoryResult<()>;

    /// Running tasks of an application's environment
    async fn get_in_flight_tasks(
        &self,
        application: &str,
        environment: &str,
    ) -> RepositoryResult<Vec<TaskRecord>>;

    /// Every running task
    async fn all_in_flight(&self) -> RepositoryResult<Vec<TaskRecord>>;

    /// Record a status change
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> RepositoryResult<()>;
}

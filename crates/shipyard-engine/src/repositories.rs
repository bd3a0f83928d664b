//! Repository handles shared by engine components

use std::sync::Arc;

use shipyard_core::{
    AgentLockRepository, ArtifactRepository, DeliveryConfigRepository, DiffFingerprintRepository,
    PausedRepository, ResourceRepository, TaskTrackingRepository,
};

/// One handle per repository trait
///
/// Usually every field points at the same store.
#[derive(Clone)]
pub struct Repositories {
    pub delivery_configs: Arc<dyn DeliveryConfigRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub diff_fingerprints: Arc<dyn DiffFingerprintRepository>,
    pub paused: Arc<dyn PausedRepository>,
    pub agent_locks: Arc<dyn AgentLockRepository>,
    pub tasks: Arc<dyn TaskTrackingRepository>,
}

impl Repositories {
    /// Use one store for every repository
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DeliveryConfigRepository
            + ArtifactRepository
            + ResourceRepository
            + DiffFingerprintRepository
            + PausedRepository
            + AgentLockRepository
            + TaskTrackingRepository
            + 'static,
    {
        Self {
            delivery_configs: store.clone(),
            artifacts: store.clone(),
            resources: store.clone(),
            diff_fingerprints: store.clone(),
            paused: store.clone(),
            agent_locks: store.clone(),
            tasks: store,
        }
    }
}

//! Delivery domain model

mod artifact;
pub mod constraint;
mod delivery_config;
mod promotion;
mod resource;
mod task;

pub use artifact::{ArtifactType, DeliveryArtifact, VersionStrategy};
pub use constraint::{
    Constraint, ConstraintState, ConstraintStatus, TimeWindow, UpdatedConstraintStatus,
};
pub use delivery_config::{DeliveryConfig, Environment, PreviewEnvironment};
pub use promotion::{
    EnvironmentArtifactPin, EnvironmentArtifactVeto, EnvironmentArtifactVetoes,
    PinnedEnvironment, PromotionStatus, VetoedVersion,
};
pub use resource::{InvalidResourceKind, Resource, ResourceId, ResourceKind};
pub use task::{Task, TaskRecord, TaskStatus};

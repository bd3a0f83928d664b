//! Shipyard Core - delivery model and contracts
//!
//! Shared vocabulary for the promotion engine:
//! - Delivery configs, environments, artifacts and constraints
//! - Pins, vetoes and persisted constraint state
//! - Resources, resource diffs and actuation tasks
//! - Events published at the observability boundary
//! - Repository contracts (consistency lives behind these)
//! - Plugin contracts: constraint evaluators, resource handlers, vetoes,
//!   scheduled agents and the task launcher
//!
//! # Example
//!
//! ```rust,ignore
//! use shipyard_core::prelude::*;
//!
//! let artifact = DeliveryArtifact::new("fnord", ArtifactType::Docker, "fnord-image");
//! let mut versions = vec!["1.2".to_string(), "2.0".to_string(), "1.10".to_string()];
//! artifact.version_strategy.sort_newest_first(&mut versions);
//! assert_eq!(versions, ["2.0", "1.10", "1.2"]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod clock;
pub mod diff;
pub mod error;
pub mod events;
pub mod model;
pub mod plugins;
pub mod repository;
pub mod settings;

pub use clock::{Clock, MutableClock, SystemClock};
pub use diff::ResourceDiff;
pub use error::{
    AgentError, ErrorClass, EvaluationError, PluginError, RepositoryError, SettingsError,
};
pub use events::{DeliveryEvent, EventPublisher, ResourceRef};
pub use model::{
    ArtifactType, Constraint, ConstraintState, ConstraintStatus, DeliveryArtifact, DeliveryConfig,
    Environment, EnvironmentArtifactPin, EnvironmentArtifactVeto, EnvironmentArtifactVetoes,
    PinnedEnvironment, PreviewEnvironment, PromotionStatus, Resource, ResourceId, ResourceKind,
    Task, TaskRecord, TaskStatus, TimeWindow, UpdatedConstraintStatus, VersionStrategy,
    VetoedVersion,
};
pub use plugins::{
    ActionDecision, ConstraintEvaluator, ResourceHandler, ScheduledAgent, TaskLauncher, Veto,
    VetoResponse,
};
pub use repository::{
    AgentLockRepository, ArtifactRepository, DeliveryConfigRepository, DiffFingerprintRepository,
    PausedRepository, ResourceRepository, TaskTrackingRepository,
};
pub use settings::Settings;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Shipyard
    pub use crate::{
        ArtifactType, Clock, Constraint, ConstraintStatus, DeliveryArtifact, DeliveryConfig,
        DeliveryEvent, Environment, EventPublisher, Resource, ResourceId, ResourceKind,
        Settings, VersionStrategy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Shipyard Engine - promotion and actuation control loop
//!
//! Components, leaf first:
//! - [`EnvironmentConstraintRunner`]: picks the version to queue for one
//!   environment/artifact pair
//! - [`EnvironmentPromotionChecker`]: per delivery config; handles pins and
//!   vetoes, delegates to the runner and issues approvals
//! - [`ResourceActuator`]: reconciles one resource through its handler,
//!   gated by pauses and vetoes
//! - [`EnvironmentCleaner`] / [`EnvironmentTaskCanceler`]: preview cleanup
//!   and cancellation of work made obsolete by a pin or veto
//! - [`CheckScheduler`]: periodic driver behind a liveness gate
//! - [`InterventionService`]: pin, veto and judgement actions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shipyard_engine::{Engine, Repositories};
//!
//! let engine = Engine::builder(Repositories::from_store(store), settings)
//!     .with_handler(Arc::new(MyClusterHandler::new()))
//!     .build();
//! engine.scheduler.on_application_up();
//! engine.scheduler.run().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod actuator;
pub mod agents;
pub mod canceler;
pub mod cleaner;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod interventions;
pub mod pause;
pub mod promotion;
pub mod publisher;
pub mod runner;
pub mod scheduler;
pub mod veto;

mod repositories;

pub use actuator::{HandlerRegistry, ResourceActuator};
pub use agents::{PreviewEnvironmentCleanupAgent, TaskMonitorAgent};
pub use canceler::EnvironmentTaskCanceler;
pub use cleaner::EnvironmentCleaner;
pub use engine::{Engine, EngineBuilder};
pub use error::{CheckError, InterventionError};
pub use interventions::InterventionService;
pub use pause::ActuationPauser;
pub use promotion::EnvironmentPromotionChecker;
pub use publisher::{BroadcastPublisher, FanoutPublisher, LoggingPublisher};
pub use repositories::Repositories;
pub use runner::{EnvironmentConstraintRunner, EnvironmentContext, EvaluatorRegistry};
pub use scheduler::{CheckScheduler, EnvironmentCheck, ResourceCheck};
pub use veto::{UnhappyVeto, VetoEnforcer};

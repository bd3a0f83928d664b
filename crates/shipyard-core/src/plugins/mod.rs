//! Plugin contracts
//!
//! - [`ConstraintEvaluator`]: promotion gating, keyed by constraint type
//! - [`ResourceHandler`]: resolution and actuation, keyed by resource kind
//! - [`Veto`]: actuation blocking
//! - [`ScheduledAgent`]: lock-guarded periodic work
//! - [`TaskLauncher`]: external task control
//!
//! With the `mocks` feature each trait also gets a `mockall` mock
//! (`MockConstraintEvaluator`, `MockResourceHandler`, ...).

mod agent;
mod constraint;
mod resource;
mod veto;

pub use agent::{ScheduledAgent, TaskLauncher};
pub use constraint::ConstraintEvaluator;
pub use resource::{ActionDecision, ResourceHandler};
pub use veto::{Veto, VetoResponse};

#[cfg(feature = "mocks")]
pub use agent::{MockScheduledAgent, MockTaskLauncher};
#[cfg(feature = "mocks")]
pub use constraint::MockConstraintEvaluator;
#[cfg(feature = "mocks")]
pub use resource::MockResourceHandler;
#[cfg(feature = "mocks")]
pub use veto::MockVeto;

//! Constraint evaluator contract

use crate::error::EvaluationError;
use crate::model::{DeliveryArtifact, DeliveryConfig, Environment};

/// Decides whether a version may be promoted into an environment
///
/// Evaluators are registered under [`ConstraintEvaluator::supported_type`]
/// and dispatched by exact key match against
/// [`Constraint::constraint_type`](crate::model::Constraint::constraint_type).
/// Implicit evaluators run for every environment, declared or not.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait::async_trait]
pub trait ConstraintEvaluator: Send + Sync {
    /// Constraint type key
    fn supported_type(&self) -> &'static str;

    /// Runs without being declared on the environment
    fn is_implicit(&self) -> bool;

    /// Persists and reads back a decision
    fn is_stateful(&self) -> bool;

    /// May `version` of `artifact` be promoted into `environment`
    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        delivery_config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError>;
}

use shipyard_core::model::constraint::ARTIFACT_USED;
use shipyard_core::{ConstraintEvaluator, DeliveryArtifact, DeliveryConfig, Environment, EvaluationError};

/// Passes when a resource in the environment deploys the artifact
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactUsedConstraintEvaluator;

#[async_trait::async_trait]
impl ConstraintEvaluator for ArtifactUsedConstraintEvaluator {
    fn supported_type(&self) -> &'static str {
        ARTIFACT_USED
    }

    fn is_implicit(&self) -> bool {
        true
    }

    fn is_stateful(&self) -> bool {
        false
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        _version: &str,
        _delivery_config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        Ok(environment.uses_artifact(&artifact.reference))
    }
}

use std::sync::Arc;

use shipyard_core::model::constraint::DEPENDS_ON;
use shipyard_core::{
    ArtifactRepository, Constraint, ConstraintEvaluator, DeliveryArtifact, DeliveryConfig,
    Environment, EvaluationError,
};
use tracing::warn;

/// Passes once the version was deployed successfully to the upstream environment
pub struct DependsOnConstraintEvaluator {
    artifacts: Arc<dyn ArtifactRepository>,
}

impl DependsOnConstraintEvaluator {
    pub fn new(artifacts: Arc<dyn ArtifactRepository>) -> Self {
        Self { artifacts }
    }
}

#[async_trait::async_trait]
impl ConstraintEvaluator for DependsOnConstraintEvaluator {
    fn supported_type(&self) -> &'static str {
        DEPENDS_ON
    }

    fn is_implicit(&self) -> bool {
        false
    }

    fn is_stateful(&self) -> bool {
        false
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        delivery_config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        let upstream = environment
            .constraints
            .iter()
            .find_map(|c| match c {
                Constraint::DependsOn { environment } => Some(environment.as_str()),
                _ => None,
            })
            .ok_or_else(|| EvaluationError::MissingConstraint {
                constraint_type: DEPENDS_ON.to_string(),
                environment: environment.name.clone(),
            })?;

        if delivery_config.environment_named(upstream).is_none() {
            warn!(
                "{} depends on unknown environment {} in {}",
                environment.name, upstream, delivery_config.name
            );
            return Ok(false);
        }

        Ok(self
            .artifacts
            .was_successfully_deployed_to(delivery_config, artifact, version, upstream)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_store_memory::InMemoryStore;
    use shipyard_test_utils::{cluster, delivery_config, docker_artifact};

    fn staging_after(upstream: &str) -> Environment {
        Environment::new("staging")
            .with_resource(cluster("staging"))
            .with_constraint(Constraint::DependsOn {
                environment: upstream.into(),
            })
    }

    #[tokio::test]
    async fn passes_once_deployed_upstream() {
        let store = Arc::new(InMemoryStore::new());
        let config = delivery_config();
        let artifact = docker_artifact();
        let staging = staging_after("test");
        let evaluator = DependsOnConstraintEvaluator::new(store.clone());

        assert!(!evaluator.can_promote(&artifact, "1.0", &config, &staging).await.unwrap());

        store
            .mark_as_successfully_deployed_to(&config, &artifact, "1.0", "test")
            .await
            .unwrap();
        assert!(evaluator.can_promote(&artifact, "1.0", &config, &staging).await.unwrap());
        assert!(!evaluator.can_promote(&artifact, "1.1", &config, &staging).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_upstream_never_passes() {
        let evaluator = DependsOnConstraintEvaluator::new(Arc::new(InMemoryStore::new()));
        let staging = staging_after("nowhere");

        assert!(!evaluator
            .can_promote(&docker_artifact(), "1.0", &delivery_config(), &staging)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn undeclared_constraint_is_an_error() {
        let evaluator = DependsOnConstraintEvaluator::new(Arc::new(InMemoryStore::new()));
        let result = evaluator
            .can_promote(&docker_artifact(), "1.0", &delivery_config(), &Environment::new("staging"))
            .await;

        assert!(matches!(result, Err(EvaluationError::MissingConstraint { .. })));
    }
}

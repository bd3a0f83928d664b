//! Preview environment cleanup

use std::sync::Arc;

use shipyard_core::{DeliveryConfigRepository, RepositoryError};
use tracing::{debug, info};

/// Deletes preview environments that no longer own resources
pub struct EnvironmentCleaner {
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    enabled: bool,
}

impl EnvironmentCleaner {
    pub fn new(delivery_configs: Arc<dyn DeliveryConfigRepository>, enabled: bool) -> Self {
        Self {
            delivery_configs,
            enabled,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Delete the environment if cleanup is enabled and it owns no resources
    ///
    /// Reads the environment fresh, so repeated calls are safe. Returns
    /// whether it was deleted.
    pub async fn cleanup_environment(
        &self,
        config_name: &str,
        environment: &str,
    ) -> Result<bool, RepositoryError> {
        if !self.enabled {
            debug!("environment cleanup disabled, keeping {}/{}", config_name, environment);
            return Ok(false);
        }

        let config = self.delivery_configs.get(config_name).await?;
        let Some(current) = config.environment_named(environment) else {
            return Ok(false);
        };
        if !current.resources.is_empty() {
            debug!(
                "{}/{} still owns {} resource(s)",
                config_name,
                environment,
                current.resources.len()
            );
            return Ok(false);
        }

        info!("deleting empty environment {}/{}", config_name, environment);
        self.delivery_configs
            .delete_environment(config_name, environment)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{DeliveryConfig, Environment, PreviewEnvironment};
    use shipyard_store_memory::InMemoryStore;
    use shipyard_test_utils::{clock, delivery_config, seeded_store, CONFIG_NAME};

    fn with_empty_preview() -> DeliveryConfig {
        delivery_config()
            .with_environment(Environment::new("test-feature-x").with_preview(PreviewEnvironment {
                branch: "feature/x".into(),
                repo_key: "stash/fnord/app".into(),
                parent_environment: "test".into(),
            }))
            .normalized()
    }

    async fn environments(store: &InMemoryStore) -> Vec<String> {
        store
            .get(CONFIG_NAME)
            .await
            .unwrap()
            .environments
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[tokio::test]
    async fn deletes_empty_environments_once() {
        let store = seeded_store(&with_empty_preview(), clock()).await;
        let cleaner = EnvironmentCleaner::new(store.clone(), true);

        assert!(cleaner.cleanup_environment(CONFIG_NAME, "test-feature-x").await.unwrap());
        assert!(!cleaner.cleanup_environment(CONFIG_NAME, "test-feature-x").await.unwrap());
        assert_eq!(environments(&store).await, ["test", "staging"]);
    }

    #[tokio::test]
    async fn keeps_environments_with_resources() {
        let store = seeded_store(&with_empty_preview(), clock()).await;
        let cleaner = EnvironmentCleaner::new(store.clone(), true);

        assert!(!cleaner.cleanup_environment(CONFIG_NAME, "test").await.unwrap());
        assert_eq!(environments(&store).await.len(), 3);
    }

    #[tokio::test]
    async fn disabled_cleanup_is_a_no_op() {
        let store = seeded_store(&with_empty_preview(), clock()).await;
        let cleaner = EnvironmentCleaner::new(store.clone(), false);

        assert!(!cleaner.cleanup_environment(CONFIG_NAME, "test-feature-x").await.unwrap());
        assert_eq!(environments(&store).await.len(), 3);
    }
}

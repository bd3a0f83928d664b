use std::sync::Arc;

use shipyard_core::{AgentError, DeliveryConfigRepository, ScheduledAgent};
use tracing::warn;

use crate::cleaner::EnvironmentCleaner;

/// Offers every preview environment to the [`EnvironmentCleaner`]
pub struct PreviewEnvironmentCleanupAgent {
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    cleaner: Arc<EnvironmentCleaner>,
}

impl PreviewEnvironmentCleanupAgent {
    pub const LOCK_NAME: &'static str = "PreviewEnvironmentCleanupAgent";

    pub fn new(delivery_configs: Arc<dyn DeliveryConfigRepository>, cleaner: Arc<EnvironmentCleaner>) -> Self {
        Self {
            delivery_configs,
            cleaner,
        }
    }
}

#[async_trait::async_trait]
impl ScheduledAgent for PreviewEnvironmentCleanupAgent {
    fn lock_name(&self) -> &'static str {
        Self::LOCK_NAME
    }

    fn lock_timeout_seconds(&self) -> u64 {
        600
    }

    async fn invoke_agent(&self) -> Result<(), AgentError> {
        if !self.cleaner.is_enabled() {
            return Ok(());
        }
        for config in self.delivery_configs.all().await? {
            for environment in config.environments.iter().filter(|e| e.is_preview()) {
                if let Err(e) = self
                    .cleaner
                    .cleanup_environment(&config.name, &environment.name)
                    .await
                {
                    warn!(
                        "unable to clean up {}/{}: {}",
                        config.name, environment.name, e
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{Environment, PreviewEnvironment};
    use shipyard_test_utils::{clock, cluster, delivery_config, seeded_store, CONFIG_NAME};

    fn preview(name: &str) -> Environment {
        Environment::new(name).with_preview(PreviewEnvironment {
            branch: format!("feature/{name}"),
            repo_key: "stash/fnord/app".into(),
            parent_environment: "test".into(),
        })
    }

    #[tokio::test]
    async fn only_empty_previews_are_removed() {
        let config = delivery_config()
            .with_environment(preview("pr-1"))
            .with_environment(preview("pr-2").with_resource(cluster("pr-2")))
            .normalized();
        let store = seeded_store(&config, clock()).await;
        let agent = PreviewEnvironmentCleanupAgent::new(
            store.clone(),
            Arc::new(EnvironmentCleaner::new(store.clone(), true)),
        );

        agent.invoke_agent().await.unwrap();

        let names: Vec<String> = store
            .get(CONFIG_NAME)
            .await
            .unwrap()
            .environments
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["test", "staging", "pr-2"]);
    }

    #[tokio::test]
    async fn disabled_cleanup_keeps_everything() {
        let config = delivery_config().with_environment(preview("pr-1")).normalized();
        let store = seeded_store(&config, clock()).await;
        let agent = PreviewEnvironmentCleanupAgent::new(
            store.clone(),
            Arc::new(EnvironmentCleaner::new(store.clone(), false)),
        );

        agent.invoke_agent().await.unwrap();

        assert_eq!(store.get(CONFIG_NAME).await.unwrap().environments.len(), 3);
    }
}

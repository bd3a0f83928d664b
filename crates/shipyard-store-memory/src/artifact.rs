//! [`ArtifactRepository`] for [`InMemoryStore`]

use shipyard_core::repository::RepositoryResult;
use shipyard_core::{
    ArtifactRepository, DeliveryArtifact, DeliveryConfig, EnvironmentArtifactPin,
    EnvironmentArtifactVeto, EnvironmentArtifactVetoes, PinnedEnvironment, PromotionStatus,
    RepositoryError, VetoedVersion,
};

use crate::{env_key, EnvArtifactState, InMemoryStore};

fn artifact_for<'a>(
    config: &'a DeliveryConfig,
    reference: &str,
) -> RepositoryResult<&'a DeliveryArtifact> {
    config
        .matching_artifact_by_reference(reference)
        .ok_or_else(|| RepositoryError::not_found("artifact", format!("{reference} in {}", config.name)))
}

impl InMemoryStore {
    fn read_env<T>(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
        f: impl FnOnce(&EnvArtifactState) -> T,
    ) -> T {
        let key = env_key(&config.name, environment, artifact.artifact_type, &artifact.reference);
        let inner = self.inner.read();
        match inner.environments.get(&key) {
            Some(state) => f(state),
            None => f(&EnvArtifactState::default()),
        }
    }

    fn write_env<T>(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
        f: impl FnOnce(&mut EnvArtifactState) -> T,
    ) -> T {
        let key = env_key(&config.name, environment, artifact.artifact_type, &artifact.reference);
        let mut inner = self.inner.write();
        f(inner.environments.entry(key).or_default())
    }
}

#[async_trait::async_trait]
impl ArtifactRepository for InMemoryStore {
    async fn store_version(&self, artifact: &DeliveryArtifact, version: &str) -> RepositoryResult<bool> {
        let mut inner = self.inner.write();
        let versions = inner
            .versions
            .entry((artifact.artifact_type, artifact.name.clone()))
            .or_default();
        if versions.iter().any(|v| v == version) {
            return Ok(false);
        }
        versions.push(version.to_string());
        Ok(true)
    }

    async fn artifact_versions(
        &self,
        artifact: &DeliveryArtifact,
        limit: usize,
    ) -> RepositoryResult<Vec<String>> {
        let mut versions = self
            .inner
            .read()
            .versions
            .get(&(artifact.artifact_type, artifact.name.clone()))
            .cloned()
            .unwrap_or_default();
        artifact.version_strategy.sort_newest_first(&mut versions);
        versions.truncate(limit);
        Ok(versions)
    }

    async fn approve_version_for(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool> {
        let now = self.now();
        Ok(self.write_env(config, artifact, environment, |state| {
            if state.is_approved(version) {
                false
            } else {
                state.approved.push((version.to_string(), now));
                true
            }
        }))
    }

    async fn is_approved_for(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool> {
        Ok(self.read_env(config, artifact, environment, |state| state.is_approved(version)))
    }

    async fn latest_version_approved_in(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.read_env(config, artifact, environment, |state| {
            state
                .approved
                .iter()
                .map(|(v, _)| v)
                .filter(|v| !state.is_vetoed(v))
                .max_by(|a, b| artifact.version_strategy.compare(a, b))
                .cloned()
        }))
    }

    async fn mark_as_deploying_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()> {
        self.write_env(config, artifact, environment, |state| {
            state.deploying = Some(version.to_string());
        });
        Ok(())
    }

    async fn mark_as_successfully_deployed_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()> {
        self.write_env(config, artifact, environment, |state| {
            if let Some(previous) = state.current.take() {
                if previous != version {
                    state.previous.push(previous);
                }
            }
            state.previous.retain(|v| v != version);
            state.current = Some(version.to_string());
            if state.deploying.as_deref() == Some(version) {
                state.deploying = None;
            }
            state.deployed.insert(version.to_string());
        });
        tracing::debug!(
            "{} {} is now current in {}/{}",
            artifact.name,
            version,
            config.name,
            environment
        );
        Ok(())
    }

    async fn was_successfully_deployed_to(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<bool> {
        Ok(self.read_env(config, artifact, environment, |state| state.deployed.contains(version)))
    }

    async fn current_version_deployed_in(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        environment: &str,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.read_env(config, artifact, environment, |state| state.current.clone()))
    }

    async fn promotion_status(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<PromotionStatus> {
        Ok(self.read_env(config, artifact, environment, |state| {
            if state.is_vetoed(version) {
                PromotionStatus::Vetoed
            } else if state.current.as_deref() == Some(version) {
                PromotionStatus::Current
            } else if state.deploying.as_deref() == Some(version) {
                PromotionStatus::Deploying
            } else if state.previous.iter().any(|v| v == version) {
                PromotionStatus::Previous
            } else if state.is_approved(version) {
                PromotionStatus::Approved
            } else {
                PromotionStatus::Pending
            }
        }))
    }

    async fn pinned_environments(
        &self,
        config: &DeliveryConfig,
    ) -> RepositoryResult<Vec<PinnedEnvironment>> {
        let inner = self.inner.read();
        let mut pins: Vec<PinnedEnvironment> = inner
            .environments
            .iter()
            .filter(|((name, ..), _)| name == &config.name)
            .filter_map(|(_, state)| state.pin.clone())
            .collect();
        pins.sort_by(|a, b| {
            (&a.target_environment, &a.artifact.reference)
                .cmp(&(&b.target_environment, &b.artifact.reference))
        });
        Ok(pins)
    }

    async fn pin_environment(
        &self,
        config: &DeliveryConfig,
        pin: &EnvironmentArtifactPin,
    ) -> RepositoryResult<()> {
        let artifact = artifact_for(config, &pin.reference)?;
        if config.environment_named(&pin.target_environment).is_none() {
            return Err(RepositoryError::not_found("environment", &pin.target_environment));
        }
        let pinned = PinnedEnvironment {
            delivery_config_name: config.name.clone(),
            target_environment: pin.target_environment.clone(),
            artifact: artifact.clone(),
            version: pin.version.clone(),
            pinned_by: pin.pinned_by.clone(),
            pinned_at: Some(self.now()),
            comment: pin.comment.clone(),
        };
        self.write_env(config, artifact, &pin.target_environment, |state| {
            state.pin = Some(pinned);
        });
        Ok(())
    }

    async fn delete_pin(
        &self,
        config: &DeliveryConfig,
        environment: &str,
        reference: &str,
    ) -> RepositoryResult<()> {
        let artifact = artifact_for(config, reference)?;
        self.write_env(config, artifact, environment, |state| state.pin = None);
        Ok(())
    }

    async fn vetoed_environment_versions(
        &self,
        config: &DeliveryConfig,
    ) -> RepositoryResult<Vec<EnvironmentArtifactVetoes>> {
        let inner = self.inner.read();
        let mut vetoes: Vec<EnvironmentArtifactVetoes> = inner
            .environments
            .iter()
            .filter(|((name, ..), state)| name == &config.name && !state.vetoed.is_empty())
            .filter_map(|((_, environment, artifact_type, reference), state)| {
                let artifact = config
                    .artifacts
                    .iter()
                    .find(|a| &a.reference == reference && a.artifact_type == *artifact_type)?;
                Some(EnvironmentArtifactVetoes {
                    delivery_config_name: config.name.clone(),
                    target_environment: environment.clone(),
                    artifact: artifact.clone(),
                    versions: state.vetoed.clone(),
                })
            })
            .collect();
        vetoes.sort_by(|a, b| {
            (&a.target_environment, &a.artifact.reference)
                .cmp(&(&b.target_environment, &b.artifact.reference))
        });
        Ok(vetoes)
    }

    async fn mark_as_vetoed_in(
        &self,
        config: &DeliveryConfig,
        veto: &EnvironmentArtifactVeto,
        force: bool,
    ) -> RepositoryResult<bool> {
        let artifact = artifact_for(config, &veto.reference)?;
        let now = self.now();
        Ok(self.write_env(config, artifact, &veto.target_environment, |state| {
            if state.is_vetoed(&veto.version) {
                return false;
            }
            if state.pin.as_ref().is_some_and(|p| p.version == veto.version) {
                tracing::warn!(
                    "pinned version cannot be vetoed: {} {} in {}",
                    artifact.name,
                    veto.version,
                    veto.target_environment
                );
                return false;
            }
            if let Some(reference) = state.rollback_targets.get(&veto.version) {
                if !force {
                    tracing::warn!(
                        "not vetoing {} {} in {}: rollback target of vetoed {}",
                        artifact.name,
                        veto.version,
                        veto.target_environment,
                        reference
                    );
                    return false;
                }
            }

            let prior = state
                .previous
                .iter()
                .rev()
                .find(|v| **v != veto.version && !state.is_vetoed(v))
                .cloned();
            if let Some(prior) = prior {
                state.rollback_targets.insert(prior, veto.version.clone());
            }
            state.vetoed.push(VetoedVersion {
                version: veto.version.clone(),
                vetoed_by: Some(veto.vetoed_by.clone()),
                vetoed_at: Some(now),
                comment: veto.comment.clone(),
            });
            true
        }))
    }

    async fn delete_veto(
        &self,
        config: &DeliveryConfig,
        artifact: &DeliveryArtifact,
        version: &str,
        environment: &str,
    ) -> RepositoryResult<()> {
        self.write_env(config, artifact, environment, |state| {
            state.vetoed.retain(|v| v.version != version);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use shipyard_core::{ArtifactType, DeliveryConfigRepository, Environment};

    use super::*;

    fn docker() -> DeliveryArtifact {
        DeliveryArtifact::new("fnord", ArtifactType::Docker, "fnord-image")
            .with_delivery_config("fnord-manifest")
    }

    fn debian() -> DeliveryArtifact {
        DeliveryArtifact::new("fnord", ArtifactType::Debian, "fnord-deb")
            .with_delivery_config("fnord-manifest")
    }

    fn config() -> DeliveryConfig {
        DeliveryConfig::new("fnord-manifest", "fnord")
            .with_artifact(docker())
            .with_artifact(debian())
            .with_environment(Environment::new("test"))
            .with_environment(Environment::new("prod"))
    }

    fn veto(version: &str) -> EnvironmentArtifactVeto {
        EnvironmentArtifactVeto {
            target_environment: "test".into(),
            reference: "fnord-image".into(),
            version: version.into(),
            vetoed_by: "deploybot@example.com".into(),
            comment: None,
        }
    }

    #[tokio::test]
    async fn versions_are_newest_first_and_keyed_by_type() {
        let store = InMemoryStore::new();
        for v in ["1.0", "1.10", "1.2"] {
            assert!(store.store_version(&docker(), v).await.unwrap());
        }
        assert!(!store.store_version(&docker(), "1.0").await.unwrap());
        store.store_version(&debian(), "9.9").await.unwrap();

        assert_eq!(store.artifact_versions(&docker(), 10).await.unwrap(), ["1.10", "1.2", "1.0"]);
        assert_eq!(store.artifact_versions(&docker(), 1).await.unwrap(), ["1.10"]);
        assert_eq!(store.artifact_versions(&debian(), 10).await.unwrap(), ["9.9"]);
    }

    #[tokio::test]
    async fn approving_twice_reports_no_change() {
        let store = InMemoryStore::new();
        let config = config();
        assert!(store.approve_version_for(&config, &docker(), "1.0", "test").await.unwrap());
        assert!(!store.approve_version_for(&config, &docker(), "1.0", "test").await.unwrap());
        assert!(store.approve_version_for(&config, &docker(), "1.1", "test").await.unwrap());

        assert_eq!(
            store.latest_version_approved_in(&config, &docker(), "test").await.unwrap(),
            Some("1.1".into())
        );
        assert_eq!(
            store.latest_version_approved_in(&config, &docker(), "prod").await.unwrap(),
            None
        );
        assert_eq!(
            store.latest_version_approved_in(&config, &debian(), "test").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn vetoed_versions_are_not_latest_approved() {
        let store = InMemoryStore::new();
        let config = config();
        store.approve_version_for(&config, &docker(), "1.0", "test").await.unwrap();
        store.approve_version_for(&config, &docker(), "1.1", "test").await.unwrap();

        assert!(store.mark_as_vetoed_in(&config, &veto("1.1"), false).await.unwrap());
        assert!(!store.mark_as_vetoed_in(&config, &veto("1.1"), false).await.unwrap());
        assert_eq!(
            store.latest_version_approved_in(&config, &docker(), "test").await.unwrap(),
            Some("1.0".into())
        );
        assert_eq!(
            store.promotion_status(&config, &docker(), "1.1", "test").await.unwrap(),
            PromotionStatus::Vetoed
        );

        let vetoes = store.vetoed_environment_versions(&config).await.unwrap();
        assert_eq!(vetoes.len(), 1);
        assert_eq!(vetoes[0].version_strings().collect::<Vec<_>>(), ["1.1"]);

        store.delete_veto(&config, &docker(), "1.1", "test").await.unwrap();
        assert!(store.vetoed_environment_versions(&config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vetoing_a_rollback_target_needs_force() {
        let store = InMemoryStore::new();
        let config = config();
        for v in ["1.0", "1.1"] {
            store.approve_version_for(&config, &docker(), v, "test").await.unwrap();
            store
                .mark_as_successfully_deployed_to(&config, &docker(), v, "test")
                .await
                .unwrap();
        }

        assert!(store.mark_as_vetoed_in(&config, &veto("1.1"), false).await.unwrap());
        assert!(!store.mark_as_vetoed_in(&config, &veto("1.0"), false).await.unwrap());
        assert!(store.mark_as_vetoed_in(&config, &veto("1.0"), true).await.unwrap());
    }

    #[tokio::test]
    async fn pinned_version_cannot_be_vetoed_without_force() {
        let store = InMemoryStore::new();
        let config = config();
        DeliveryConfigRepository::store(&store, config.clone()).await.unwrap();
        store
            .pin_environment(
                &config,
                &EnvironmentArtifactPin {
                    target_environment: "test".into(),
                    reference: "fnord-image".into(),
                    version: "1.0".into(),
                    pinned_by: Some("deploybot@example.com".into()),
                    comment: None,
                },
            )
            .await
            .unwrap();

        let pins = store.pinned_environments(&config).await.unwrap();
        assert_eq!(pins.len(), 1);
        assert!(pins[0].matches("test", &docker()));
        assert!(!pins[0].matches("test", &debian()));

        assert!(!store.mark_as_vetoed_in(&config, &veto("1.0"), false).await.unwrap());

        store.delete_pin(&config, "test", "fnord-image").await.unwrap();
        assert!(store.pinned_environments(&config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deployment_tracking() {
        let store = InMemoryStore::new();
        let config = config();
        store.mark_as_deploying_to(&config, &docker(), "1.0", "test").await.unwrap();
        assert_eq!(
            store.promotion_status(&config, &docker(), "1.0", "test").await.unwrap(),
            PromotionStatus::Deploying
        );
        store
            .mark_as_successfully_deployed_to(&config, &docker(), "1.0", "test")
            .await
            .unwrap();
        store
            .mark_as_successfully_deployed_to(&config, &docker(), "1.1", "test")
            .await
            .unwrap();

        assert_eq!(
            store.current_version_deployed_in(&config, &docker(), "test").await.unwrap(),
            Some("1.1".into())
        );
        assert_eq!(
            store.promotion_status(&config, &docker(), "1.0", "test").await.unwrap(),
            PromotionStatus::Previous
        );
        assert!(store.was_successfully_deployed_to(&config, &docker(), "1.0", "test").await.unwrap());
        assert!(!store.was_successfully_deployed_to(&config, &docker(), "1.0", "prod").await.unwrap());
    }
}

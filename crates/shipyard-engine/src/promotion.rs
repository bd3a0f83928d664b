//! Promotion checker
//!
//! Entry point of a delivery config's promotion check. Environments are
//! visited in declaration order, and artifacts in declaration order within
//! each environment. For every pair whose environment deploys the artifact:
//! - a pin approves the pinned version directly; no evaluator runs and
//!   the version need not be known yet
//! - otherwise the runner queues what passes, and each queued version is
//!   rechecked against stateless constraints before it is approved
//!
//! A failure on one pair is logged and the remaining pairs still run.

use std::collections::HashSet;
use std::sync::Arc;

use shipyard_core::{
    Clock, DeliveryArtifact, DeliveryConfig, DeliveryEvent, Environment,
    EnvironmentArtifactVetoes, EvaluationError, EventPublisher, PinnedEnvironment,
    PromotionStatus, RepositoryError,
};
use tracing::{debug, error, info};

use crate::repositories::Repositories;
use crate::runner::{EnvironmentConstraintRunner, EnvironmentContext};

/// Approves artifact versions for the environments of a delivery config
pub struct EnvironmentPromotionChecker {
    repositories: Repositories,
    runner: Arc<EnvironmentConstraintRunner>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    max_considered_versions: usize,
}

impl EnvironmentPromotionChecker {
    /// Create a checker
    pub fn new(
        repositories: Repositories,
        runner: Arc<EnvironmentConstraintRunner>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            runner,
            publisher,
            clock,
            max_considered_versions: 30,
        }
    }

    /// With the number of newest versions considered per artifact
    #[inline]
    #[must_use]
    pub fn with_max_considered_versions(mut self, max: usize) -> Self {
        self.max_considered_versions = max;
        self
    }

    /// Check every environment/artifact pair of the config
    ///
    /// Only the initial pin and veto reads propagate errors.
    pub async fn check_environments(&self, config: &DeliveryConfig) -> Result<(), RepositoryError> {
        let pins = self.repositories.artifacts.pinned_environments(config).await?;
        let vetoes = self
            .repositories
            .artifacts
            .vetoed_environment_versions(config)
            .await?;

        for environment in &config.environments {
            for artifact in &config.artifacts {
                if !environment.uses_artifact(&artifact.reference) {
                    continue;
                }
                if let Err(e) = self
                    .check_pair(config, environment, artifact, &pins, &vetoes)
                    .await
                {
                    error!(
                        "failed to check {} in {}/{}: {}",
                        artifact, config.name, environment.name, e
                    );
                }
            }
        }
        Ok(())
    }

    async fn check_pair(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        pins: &[PinnedEnvironment],
        vetoes: &[EnvironmentArtifactVetoes],
    ) -> Result<(), EvaluationError> {
        let artifacts = &self.repositories.artifacts;
        let vetoed: HashSet<String> = vetoes
            .iter()
            .filter(|v| {
                v.target_environment == environment.name
                    && v.artifact.reference == artifact.reference
                    && v.artifact.artifact_type == artifact.artifact_type
            })
            .flat_map(EnvironmentArtifactVetoes::version_strings)
            .map(str::to_string)
            .collect();

        let current = artifacts
            .current_version_deployed_in(config, artifact, &environment.name)
            .await?;
        if current.as_ref().is_some_and(|v| vetoed.contains(v)) {
            info!(
                "current version of {} in {}/{} is vetoed, rechecking resources",
                artifact, config.name, environment.name
            );
            self.recheck_resources(config, environment).await?;
        }

        if let Some(pin) = pins.iter().find(|p| p.matches(&environment.name, artifact)) {
            return self.approve_pinned(config, environment, artifact, pin).await;
        }

        let versions = artifacts
            .artifact_versions(artifact, self.max_considered_versions)
            .await?;
        if versions.is_empty() {
            debug!("no versions of {} known yet", artifact);
            return Ok(());
        }

        let ctx = EnvironmentContext::new(config, environment, artifact, versions).with_vetoed(vetoed);
        self.runner.check_environment(&ctx).await?;

        let queued = self
            .repositories
            .delivery_configs
            .get_queued_constraint_approvals(&config.name, &environment.name, &artifact.reference)
            .await?;
        for version in queued {
            if ctx.vetoed.contains(&version) {
                debug!("dropping vetoed {} {} from the approval queue", artifact, version);
                self.dequeue(config, environment, artifact, &version).await?;
                continue;
            }
            if !self
                .runner
                .check_stateless_constraints(artifact, &version, config, environment)
                .await?
            {
                debug!(
                    "queued {} {} no longer passes in {}/{}",
                    artifact, version, config.name, environment.name
                );
                continue;
            }
            self.approve(config, environment, artifact, &version).await?;
            self.dequeue(config, environment, artifact, &version).await?;
        }
        Ok(())
    }

    async fn approve_pinned(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        pin: &PinnedEnvironment,
    ) -> Result<(), EvaluationError> {
        if self.approve(config, environment, artifact, &pin.version).await? {
            return Ok(());
        }
        let status = self
            .repositories
            .artifacts
            .promotion_status(config, artifact, &pin.version, &environment.name)
            .await?;
        if !matches!(status, PromotionStatus::Current | PromotionStatus::Deploying) {
            debug!(
                "pinned {} {} is {} in {}/{}, rechecking resources",
                artifact, pin.version, status, config.name, environment.name
            );
            self.recheck_resources(config, environment).await?;
        }
        Ok(())
    }

    /// Approve and announce; true if the approval is new
    async fn approve(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        version: &str,
    ) -> Result<bool, RepositoryError> {
        let approved = self
            .repositories
            .artifacts
            .approve_version_for(config, artifact, version, &environment.name)
            .await?;
        if approved {
            info!(
                "approved {} {} for {}/{}",
                artifact, version, config.name, environment.name
            );
            self.publisher.publish(DeliveryEvent::ArtifactVersionApproved {
                application: config.application.clone(),
                delivery_config_name: config.name.clone(),
                environment_name: environment.name.clone(),
                artifact_name: artifact.name.clone(),
                artifact_type: artifact.artifact_type,
                version: version.to_string(),
                at: self.clock.now(),
            });
            self.recheck_resources(config, environment).await?;
        }
        Ok(approved)
    }

    async fn dequeue(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        version: &str,
    ) -> Result<(), RepositoryError> {
        self.repositories
            .delivery_configs
            .delete_queued_constraint_approval(
                &config.name,
                &environment.name,
                &artifact.reference,
                version,
            )
            .await
    }

    async fn recheck_resources(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<(), RepositoryError> {
        self.repositories
            .resources
            .trigger_resource_recheck(&environment.name, &config.application)
            .await
    }
}

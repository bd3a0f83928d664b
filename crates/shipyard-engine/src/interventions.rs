//! Operator interventions
//!
//! Pins, vetoes and explicit constraint judgements. Every successful
//! intervention marks the delivery config due for its next promotion check.

use std::sync::Arc;

use shipyard_core::{
    Clock, ConstraintState, DeliveryArtifact, DeliveryConfig, DeliveryEvent, Environment,
    EnvironmentArtifactPin, EnvironmentArtifactVeto, EventPublisher, UpdatedConstraintStatus,
};
use tracing::{info, warn};

use crate::canceler::EnvironmentTaskCanceler;
use crate::error::InterventionError;
use crate::repositories::Repositories;

/// Applies operator actions
pub struct InterventionService {
    repositories: Repositories,
    canceler: Option<Arc<EnvironmentTaskCanceler>>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl InterventionService {
    pub fn new(
        repositories: Repositories,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            canceler: None,
            publisher,
            clock,
        }
    }

    /// With a canceler for tasks a pin or veto makes obsolete
    #[inline]
    #[must_use]
    pub fn with_canceler(mut self, canceler: Arc<EnvironmentTaskCanceler>) -> Self {
        self.canceler = Some(canceler);
        self
    }

    /// Pin an environment to a version
    pub async fn pin(
        &self,
        user: &str,
        application: &str,
        pin: EnvironmentArtifactPin,
    ) -> Result<(), InterventionError> {
        let config = self.delivery_config(application).await?;
        environment(&config, &pin.target_environment)?;
        artifact(&config, &pin.reference)?;

        let pin = EnvironmentArtifactPin {
            pinned_by: pin.pinned_by.or_else(|| Some(user.to_string())),
            ..pin
        };
        info!(
            "{} pinned {} to {} {}",
            user, pin.target_environment, pin.reference, pin.version
        );
        self.repositories.artifacts.pin_environment(&config, &pin).await?;

        if let Some(canceler) = &self.canceler {
            if let Err(e) = canceler.cancel_tasks_for_pin(application, &pin, user).await {
                warn!("unable to cancel tasks made obsolete by pin: {}", e);
            }
        }
        self.recheck(application).await
    }

    /// Remove a pin
    pub async fn delete_pin(
        &self,
        user: &str,
        application: &str,
        environment_name: &str,
        reference: &str,
    ) -> Result<(), InterventionError> {
        let config = self.delivery_config(application).await?;
        environment(&config, environment_name)?;
        info!("{} unpinned {} in {}", user, reference, environment_name);
        self.repositories
            .artifacts
            .delete_pin(&config, environment_name, reference)
            .await?;
        self.recheck(application).await
    }

    /// Veto a version in an environment
    ///
    /// Fails with [`InterventionError::InvalidVeto`] when the repository
    /// refuses, e.g. for a pinned version or, without `force`, a rollback
    /// target.
    pub async fn mark_as_vetoed(
        &self,
        user: &str,
        application: &str,
        veto: EnvironmentArtifactVeto,
        force: bool,
    ) -> Result<(), InterventionError> {
        let config = self.delivery_config(application).await?;
        environment(&config, &veto.target_environment)?;
        artifact(&config, &veto.reference)?;

        if !self
            .repositories
            .artifacts
            .mark_as_vetoed_in(&config, &veto, force)
            .await?
        {
            return Err(InterventionError::InvalidVeto {
                environment: veto.target_environment,
                reference: veto.reference,
                version: veto.version,
            });
        }
        info!(
            "{} vetoed {} {} in {}",
            user, veto.reference, veto.version, veto.target_environment
        );
        self.publisher.publish(DeliveryEvent::ArtifactVersionVetoed {
            application: config.application.clone(),
            delivery_config_name: config.name.clone(),
            environment_name: veto.target_environment.clone(),
            artifact_reference: veto.reference.clone(),
            version: veto.version.clone(),
            vetoed_by: veto.vetoed_by.clone(),
            at: self.clock.now(),
        });

        if let Some(canceler) = &self.canceler {
            if let Err(e) = canceler.cancel_tasks_for_veto(application, &veto, user).await {
                warn!("unable to cancel tasks made obsolete by veto: {}", e);
            }
        }
        self.recheck(application).await
    }

    /// Lift a veto
    pub async fn delete_veto(
        &self,
        application: &str,
        environment_name: &str,
        reference: &str,
        version: &str,
    ) -> Result<(), InterventionError> {
        let config = self.delivery_config(application).await?;
        environment(&config, environment_name)?;
        let artifact = artifact(&config, reference)?;
        info!("lifting veto of {} {} in {}", reference, version, environment_name);
        self.repositories
            .artifacts
            .delete_veto(&config, artifact, version, environment_name)
            .await?;
        self.recheck(application).await
    }

    /// Record a human judgement on a constraint; true if the status changed
    ///
    /// This is the only way a constraint moves out of a final status.
    pub async fn update_constraint_status(
        &self,
        user: &str,
        application: &str,
        environment_name: &str,
        update: &UpdatedConstraintStatus,
    ) -> Result<bool, InterventionError> {
        let config = self.delivery_config(application).await?;
        let environment = environment(&config, environment_name)?;
        if !environment
            .constraints
            .iter()
            .any(|c| c.constraint_type() == update.constraint_type)
        {
            return Err(InterventionError::ConstraintNotFound {
                environment: environment_name.to_string(),
                constraint_type: update.constraint_type.clone(),
            });
        }

        let now = self.clock.now();
        let delivery_configs = &self.repositories.delivery_configs;
        let current = delivery_configs
            .get_constraint_state(
                &config.name,
                environment_name,
                &update.artifact_reference,
                &update.artifact_version,
                &update.constraint_type,
            )
            .await?
            .unwrap_or_else(|| {
                ConstraintState::pending(
                    &config.name,
                    environment_name,
                    &update.artifact_reference,
                    &update.artifact_version,
                    &update.constraint_type,
                    now,
                )
            });
        if current.status == update.status && current.judged_by.is_some() {
            return Ok(false);
        }

        info!(
            "{} judged {} of {} {} in {}: {:?}",
            user,
            update.constraint_type,
            update.artifact_reference,
            update.artifact_version,
            environment_name,
            update.status
        );
        delivery_configs
            .store_constraint_state(current.judged(
                update.status,
                user,
                now,
                update.comment.clone(),
            ))
            .await?;
        self.recheck(application).await?;
        Ok(true)
    }

    async fn delivery_config(&self, application: &str) -> Result<DeliveryConfig, InterventionError> {
        match self
            .repositories
            .delivery_configs
            .delivery_config_for_application(application)
            .await
        {
            Ok(config) => Ok(config),
            Err(e) if e.is_not_found() => {
                Err(InterventionError::NoSuchDeliveryConfig(application.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recheck(&self, application: &str) -> Result<(), InterventionError> {
        self.repositories
            .delivery_configs
            .trigger_recheck(application)
            .await?;
        Ok(())
    }
}

fn environment<'a>(
    config: &'a DeliveryConfig,
    name: &str,
) -> Result<&'a Environment, InterventionError> {
    config
        .environment_named(name)
        .ok_or_else(|| InterventionError::EnvironmentNotFound {
            config: config.name.clone(),
            environment: name.to_string(),
        })
}

fn artifact<'a>(
    config: &'a DeliveryConfig,
    reference: &str,
) -> Result<&'a DeliveryArtifact, InterventionError> {
    config
        .matching_artifact_by_reference(reference)
        .ok_or_else(|| InterventionError::ArtifactNotFound {
            config: config.name.clone(),
            reference: reference.to_string(),
        })
}

//! Resource actuator
//!
//! One check of one resource, in order:
//! 1. find the handler for the resource kind
//! 2. skip when paused, when the handler reports work in progress, or when
//!    the delivery config's promotion check is stale
//! 3. resolve desired and current state concurrently and diff them
//! 4. on a diff: consult vetoes, then create or update through the handler
//! 5. without a diff: record the resource as valid or its delta as resolved
//!
//! Plugin failures end the check with a `ResourceCheckError` or
//! `ResourceCheckUnresolvable` event. Repository failures propagate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use shipyard_core::{
    Clock, DeliveryArtifact, DeliveryConfig, DeliveryEvent, Environment, EnvironmentArtifactVeto,
    EventPublisher, RepositoryError, Resource, ResourceDiff, ResourceHandler, ResourceKind, Task,
    TaskRecord, TaskStatus, VetoResponse,
};
use tracing::{debug, error, info, warn};

use crate::error::CheckError;
use crate::pause::ActuationPauser;
use crate::repositories::Repositories;
use crate::veto::VetoEnforcer;

/// Identity recorded on vetoes the actuator issues itself
const VETOED_BY: &str = "shipyard";

/// Resource handlers keyed by the kind they support
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn ResourceHandler>>) -> Self {
        let mut registry = Self::default();
        for handler in handlers {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler, replacing any handler for the same kind
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.supported_kind(), handler);
    }

    /// Handler owning exactly this kind
    #[inline]
    #[must_use]
    pub fn for_kind(&self, kind: &ResourceKind) -> Option<&Arc<dyn ResourceHandler>> {
        self.handlers.get(kind)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Reconciles resources through their handlers
pub struct ResourceActuator {
    repositories: Repositories,
    handlers: HandlerRegistry,
    pauser: Arc<ActuationPauser>,
    vetoes: VetoEnforcer,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl ResourceActuator {
    pub fn new(
        repositories: Repositories,
        handlers: HandlerRegistry,
        pauser: Arc<ActuationPauser>,
        vetoes: VetoEnforcer,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            handlers,
            pauser,
            vetoes,
            publisher,
            clock,
            stale_after: Duration::minutes(5),
        }
    }

    /// With the age past which a promotion check counts as stale
    #[inline]
    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    #[inline]
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Check one resource
    ///
    /// Only repository failures are returned; everything else is reported
    /// as an event.
    pub async fn check_resource(&self, resource: &Resource) -> Result<(), RepositoryError> {
        match self.check(resource).await {
            Ok(()) => Ok(()),
            Err(CheckError::Repository(e)) => Err(e),
            Err(e) if e.is_transient() => {
                warn!("{} is currently unresolvable: {}", resource.id, e);
                self.emit(DeliveryEvent::ResourceCheckUnresolvable {
                    resource: resource.into(),
                    message: e.to_string(),
                    at: self.clock.now(),
                })
                .await
            }
            Err(e) => {
                error!("check of {} failed: {}", resource.id, e);
                self.emit(DeliveryEvent::ResourceCheckError {
                    resource: resource.into(),
                    error_type: e.error_type().to_string(),
                    error_class: e.class(),
                    message: e.to_string(),
                    at: self.clock.now(),
                })
                .await
            }
        }
    }

    async fn check(&self, resource: &Resource) -> Result<(), CheckError> {
        let handler = self
            .handlers
            .for_kind(&resource.kind)
            .ok_or_else(|| CheckError::NoHandler {
                kind: resource.kind.clone(),
            })?;
        let config = self
            .repositories
            .delivery_configs
            .delivery_config_for_resource(&resource.id)
            .await?;
        let environment = config
            .environment_of_resource(&resource.id)
            .ok_or_else(|| CheckError::EnvironmentNotFound {
                id: resource.id.clone(),
                config: config.name.clone(),
            })?;

        if self.pauser.is_paused(resource).await? {
            return self.skip(resource, "ActuationPaused").await;
        }
        let in_progress = handler
            .actuation_in_progress(resource)
            .await
            .map_err(|source| CheckError::Resolution {
                id: resource.id.clone(),
                source,
            })?;
        if in_progress {
            return self.skip(resource, "ActuationInProgress").await;
        }
        let last_checked = self
            .repositories
            .delivery_configs
            .delivery_config_last_checked(&config.name)
            .await?;
        let now = self.clock.now();
        if last_checked.map_or(true, |at| now.signed_duration_since(at) > self.stale_after) {
            debug!("promotion check of {} is stale, skipping {}", config.name, resource.id);
            return self.skip(resource, "PromotionCheckStale").await;
        }

        let (desired, current) = tokio::join!(handler.desired(resource), handler.current(resource));
        let resolution = |source| CheckError::Resolution {
            id: resource.id.clone(),
            source,
        };
        let diff = ResourceDiff::new(desired.map_err(resolution)?, current.map_err(resolution)?);

        let fingerprints = &self.repositories.diff_fingerprints;
        if diff.has_changes() {
            fingerprints.store(&resource.id, &diff).await?;
            self.actuate(handler.as_ref(), &config, environment, resource, &diff).await
        } else {
            fingerprints.clear(&resource.id).await?;
            self.converged(handler.as_ref(), &config, environment, resource, &diff).await
        }
    }

    async fn actuate(
        &self,
        handler: &dyn ResourceHandler,
        config: &DeliveryConfig,
        environment: &Environment,
        resource: &Resource,
        diff: &ResourceDiff,
    ) -> Result<(), CheckError> {
        let response = self.vetoes.can_check(resource).await?;
        if !response.allowed {
            info!("actuation of {} vetoed by {}", resource.id, response.veto_name);
            if response.veto_artifact {
                self.veto_artifact(handler, config, environment, resource, diff, &response)
                    .await;
            }
            self.skip(resource, &response.veto_name).await?;
            self.emit(DeliveryEvent::ResourceActuationVetoed {
                resource: resource.into(),
                reason: response.message,
                veto_name: response.veto_name,
                suggested_status: response.suggested_status,
                at: self.clock.now(),
            })
            .await?;
            return Ok(());
        }

        let actuation = |source| CheckError::Actuation {
            id: resource.id.clone(),
            source,
        };
        let decision = handler
            .will_take_action(resource, diff)
            .await
            .map_err(actuation)?;
        if !decision.will_act {
            self.emit(self.delta_event(resource, diff)).await?;
            debug!("{} declined to act on {}", handler.name(), resource.id);
            self.emit(DeliveryEvent::ResourceDiffNotActionable {
                resource: resource.into(),
                message: decision.message,
                at: self.clock.now(),
            })
            .await?;
            return Ok(());
        }

        self.emit(self.delta_event(resource, diff)).await?;
        let tasks = if diff.is_missing() {
            info!("creating {}", resource.id);
            handler.create(resource, diff).await.map_err(actuation)?
        } else {
            info!("updating {}", resource.id);
            let tasks = handler.update(resource, diff).await.map_err(actuation)?;
            if tasks.is_empty() {
                return Ok(());
            }
            tasks
        };
        self.launched(handler, config, environment, resource, diff, tasks).await
    }

    async fn launched(
        &self,
        handler: &dyn ResourceHandler,
        config: &DeliveryConfig,
        environment: &Environment,
        resource: &Resource,
        diff: &ResourceDiff,
        tasks: Vec<Task>,
    ) -> Result<(), CheckError> {
        let now = self.clock.now();
        let version = handler.artifact_version(diff.desired());
        for task in &tasks {
            self.repositories
                .tasks
                .store(TaskRecord {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    resource_id: resource.id.clone(),
                    application: resource.application.clone(),
                    environment_name: environment.name.clone(),
                    artifact_version: version.clone(),
                    started_at: now,
                    status: TaskStatus::Running,
                })
                .await?;
        }
        self.repositories
            .diff_fingerprints
            .mark_action_taken(&resource.id)
            .await?;
        self.emit(DeliveryEvent::ResourceActuationLaunched {
            resource: resource.into(),
            plugin: handler.name().to_string(),
            tasks,
            at: now,
        })
        .await?;

        if let (Some(version), Some(artifact)) = (version, artifact_of(config, resource)) {
            self.repositories
                .artifacts
                .mark_as_deploying_to(config, artifact, &version, &environment.name)
                .await?;
        }
        Ok(())
    }

    async fn converged(
        &self,
        handler: &dyn ResourceHandler,
        config: &DeliveryConfig,
        environment: &Environment,
        resource: &Resource,
        diff: &ResourceDiff,
    ) -> Result<(), CheckError> {
        if let (Some(version), Some(artifact)) =
            (handler.artifact_version(diff.desired()), artifact_of(config, resource))
        {
            self.repositories
                .artifacts
                .mark_as_successfully_deployed_to(config, artifact, &version, &environment.name)
                .await?;
        }

        let last = self.repositories.resources.last_event(&resource.id).await?;
        let event = match last {
            Some(DeliveryEvent::ResourceActuationLaunched { .. }) => None,
            Some(
                DeliveryEvent::ResourceDeltaDetected { .. }
                | DeliveryEvent::ResourceTaskSucceeded { .. }
                | DeliveryEvent::ResourceTaskFailed { .. },
            ) => Some(DeliveryEvent::ResourceDeltaResolved {
                resource: resource.into(),
                at: self.clock.now(),
            }),
            Some(DeliveryEvent::ResourceValid { .. } | DeliveryEvent::ResourceDeltaResolved { .. }) => None,
            _ => Some(DeliveryEvent::ResourceValid {
                resource: resource.into(),
                at: self.clock.now(),
            }),
        };
        if let Some(event) = event {
            self.emit(event).await?;
        }
        Ok(())
    }

    /// Veto the version being deployed unless it ever succeeded here
    ///
    /// Failures are logged; the resource veto still applies.
    async fn veto_artifact(
        &self,
        handler: &dyn ResourceHandler,
        config: &DeliveryConfig,
        environment: &Environment,
        resource: &Resource,
        diff: &ResourceDiff,
        response: &VetoResponse,
    ) {
        let Some(version) = handler.artifact_version(diff.desired()) else {
            return;
        };
        let Some(artifact) = artifact_of(config, resource) else {
            return;
        };
        let artifacts = &self.repositories.artifacts;

        match artifacts
            .was_successfully_deployed_to(config, artifact, &version, &environment.name)
            .await
        {
            Ok(true) => {
                debug!(
                    "{} {} was deployed to {} before, not vetoing it",
                    artifact, version, environment.name
                );
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("unable to look up deployments of {} {}: {}", artifact, version, e);
                return;
            }
        }

        let veto = EnvironmentArtifactVeto {
            target_environment: environment.name.clone(),
            reference: artifact.reference.clone(),
            version: version.clone(),
            vetoed_by: VETOED_BY.to_string(),
            comment: response.message.clone(),
        };
        match artifacts.mark_as_vetoed_in(config, &veto, false).await {
            Ok(true) => {
                info!(
                    "vetoed {} {} in {}/{} after {} blocked {}",
                    artifact, version, config.name, environment.name, response.veto_name, resource.id
                );
                self.publisher.publish(DeliveryEvent::ArtifactVersionVetoed {
                    application: config.application.clone(),
                    delivery_config_name: config.name.clone(),
                    environment_name: environment.name.clone(),
                    artifact_reference: artifact.reference.clone(),
                    version,
                    vetoed_by: VETOED_BY.to_string(),
                    at: self.clock.now(),
                });
            }
            Ok(false) => debug!("veto of {} {} in {} refused", artifact, version, environment.name),
            Err(e) => warn!("unable to veto {} {}: {}", artifact, version, e),
        }
    }

    fn delta_event(&self, resource: &Resource, diff: &ResourceDiff) -> DeliveryEvent {
        if diff.is_missing() {
            DeliveryEvent::ResourceMissing {
                resource: resource.into(),
                at: self.clock.now(),
            }
        } else {
            DeliveryEvent::ResourceDeltaDetected {
                resource: resource.into(),
                delta: diff.delta_json(),
                at: self.clock.now(),
            }
        }
    }

    async fn skip(&self, resource: &Resource, reason: &str) -> Result<(), CheckError> {
        debug!("skipping {}: {}", resource.id, reason);
        self.emit(DeliveryEvent::ResourceCheckSkipped {
            resource: resource.into(),
            reason: reason.to_string(),
            at: self.clock.now(),
        })
        .await?;
        Ok(())
    }

    /// Append to history when applicable, then publish
    async fn emit(&self, event: DeliveryEvent) -> Result<(), RepositoryError> {
        if event.is_history_event() {
            self.repositories.resources.append_history(&event).await?;
        }
        self.publisher.publish(event);
        Ok(())
    }
}

fn artifact_of<'a>(config: &'a DeliveryConfig, resource: &Resource) -> Option<&'a DeliveryArtifact> {
    resource
        .artifact_reference
        .as_deref()
        .and_then(|reference| config.matching_artifact_by_reference(reference))
}

//! Actuation pauses
//!
//! Pausing an application pauses every resource in its delivery config.
//! Each affected resource gets a `ResourceActuationPaused` or
//! `ResourceActuationResumed` history entry.

use std::sync::Arc;

use shipyard_core::{
    Clock, DeliveryEvent, EventPublisher, RepositoryError, Resource, ResourceId,
};
use tracing::info;

use crate::repositories::Repositories;

/// Pauses and resumes actuation
pub struct ActuationPauser {
    repositories: Repositories,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ActuationPauser {
    pub fn new(
        repositories: Repositories,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            publisher,
            clock,
        }
    }

    /// Paused directly or through its application
    pub async fn is_paused(&self, resource: &Resource) -> Result<bool, RepositoryError> {
        let paused = &self.repositories.paused;
        Ok(paused.application_paused(&resource.application).await?
            || paused.resource_paused(&resource.id).await?)
    }

    pub async fn pause_application(&self, application: &str, user: &str) -> Result<(), RepositoryError> {
        info!("pausing application {} on behalf of {}", application, user);
        self.repositories.paused.pause_application(application).await?;
        for resource in self.application_resources(application).await? {
            self.record(DeliveryEvent::ResourceActuationPaused {
                resource: (&resource).into(),
                by: Some(user.to_string()),
                at: self.clock.now(),
            })
            .await?;
        }
        Ok(())
    }

    pub async fn resume_application(&self, application: &str, user: &str) -> Result<(), RepositoryError> {
        info!("resuming application {} on behalf of {}", application, user);
        self.repositories.paused.resume_application(application).await?;
        for resource in self.application_resources(application).await? {
            self.record(DeliveryEvent::ResourceActuationResumed {
                resource: (&resource).into(),
                by: Some(user.to_string()),
                at: self.clock.now(),
            })
            .await?;
        }
        Ok(())
    }

    pub async fn pause_resource(&self, id: &ResourceId, user: &str) -> Result<(), RepositoryError> {
        let resource = self.repositories.resources.get(id).await?;
        info!("pausing resource {} on behalf of {}", id, user);
        self.repositories.paused.pause_resource(id).await?;
        self.record(DeliveryEvent::ResourceActuationPaused {
            resource: (&resource).into(),
            by: Some(user.to_string()),
            at: self.clock.now(),
        })
        .await
    }

    pub async fn resume_resource(&self, id: &ResourceId, user: &str) -> Result<(), RepositoryError> {
        let resource = self.repositories.resources.get(id).await?;
        info!("resuming resource {} on behalf of {}", id, user);
        self.repositories.paused.resume_resource(id).await?;
        self.record(DeliveryEvent::ResourceActuationResumed {
            resource: (&resource).into(),
            by: Some(user.to_string()),
            at: self.clock.now(),
        })
        .await
    }

    async fn application_resources(&self, application: &str) -> Result<Vec<Resource>, RepositoryError> {
        match self
            .repositories
            .delivery_configs
            .delivery_config_for_application(application)
            .await
        {
            Ok(config) => Ok(config.resources().cloned().collect()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn record(&self, event: DeliveryEvent) -> Result<(), RepositoryError> {
        self.repositories.resources.append_history(&event).await?;
        self.publisher.publish(event);
        Ok(())
    }
}

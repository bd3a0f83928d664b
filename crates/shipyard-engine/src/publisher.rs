//! Event publishers
//!
//! - [`LoggingPublisher`]: every event to `tracing`
//! - [`BroadcastPublisher`]: in-process subscribers over a broadcast channel
//! - [`FanoutPublisher`]: several publishers behind one

use std::sync::Arc;

use shipyard_core::{DeliveryEvent, EventPublisher};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Logs each event
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

impl EventPublisher for LoggingPublisher {
    fn publish(&self, event: DeliveryEvent) {
        match &event {
            DeliveryEvent::ResourceCheckSkipped { resource, reason, .. } => {
                debug!("{} {}: {}", event.name(), resource.id, reason);
            }
            DeliveryEvent::ArtifactVersionApproved {
                delivery_config_name,
                environment_name,
                artifact_name,
                version,
                ..
            } => {
                info!(
                    "{} {} {} in {}/{}",
                    event.name(),
                    artifact_name,
                    version,
                    delivery_config_name,
                    environment_name
                );
            }
            DeliveryEvent::ArtifactVersionVetoed {
                delivery_config_name,
                environment_name,
                artifact_reference,
                version,
                ..
            } => {
                info!(
                    "{} {} {} in {}/{}",
                    event.name(),
                    artifact_reference,
                    version,
                    delivery_config_name,
                    environment_name
                );
            }
            other => {
                if let Some(resource) = other.resource() {
                    info!("{} {}", other.name(), resource.id);
                }
            }
        }
    }
}

/// Fans events out to in-process subscribers
///
/// Slow subscribers lag and lose the oldest events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DeliveryEvent>,
}

impl BroadcastPublisher {
    /// Channel holding up to `capacity` unread events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.sender.subscribe()
    }

    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: DeliveryEvent) {
        if self.sender.send(event).is_err() {
            trace!("no subscribers for delivery events");
        }
    }
}

/// Publishes to every wrapped publisher in order
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }

    /// With one more publisher
    #[must_use]
    pub fn with(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(&self, event: DeliveryEvent) {
        if let Some((last, rest)) = self.publishers.split_last() {
            for publisher in rest {
                publisher.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

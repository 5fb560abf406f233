// Outbound path: tag a payload and hand it to the broker
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::broker::{BrokerClient, BrokerError};
use crate::messaging::{OutboundMessage, OutboundMessageExt};

/// A domain event that knows its own routing tag.
///
/// The tag is only used to fill message metadata when publishing; the
/// consumer side never reads it back out of the body.
pub trait PlatformEvent: Serialize + Send + Sync {
    fn event_type(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Event type must not be empty")]
    EmptyEventType,

    #[error("Failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker rejected event {event_type}: {source}")]
    Broker {
        event_type: String,
        #[source]
        source: BrokerError,
    },
}

/// Publishes tagged events onto the shared topic
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn BrokerClient>,
    topic: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn BrokerClient>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send `payload` with `eventType = event_type`. No retry on failure.
    #[tracing::instrument(skip(self, payload), fields(topic = %self.topic, payload_len = payload.len()))]
    pub async fn publish(&self, event_type: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if event_type.trim().is_empty() {
            return Err(PublishError::EmptyEventType);
        }

        let message = OutboundMessage::new(payload).with_event_type(event_type);
        match self.broker.send(&self.topic, message).await {
            Ok(offset) => {
                debug!(target: "publisher", event_type = %event_type, offset, "Event published");
                Ok(())
            }
            Err(source) => {
                warn!(target: "publisher", event_type = %event_type, error = %source, "Publish failed");
                Err(PublishError::Broker {
                    event_type: event_type.to_string(),
                    source,
                })
            }
        }
    }

    /// Serialize a typed event to JSON and publish it under its own tag.
    pub async fn publish_event<E: PlatformEvent>(&self, event: &E) -> Result<(), PublishError> {
        let body = serde_json::to_vec(event)?;
        self.publish(event.event_type(), body).await
    }
}

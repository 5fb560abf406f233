//! Broker boundary.
//!
//! The routing core only needs two things from a broker: deliver a message
//! with a byte body and string metadata to a topic, and hand back the
//! messages of a topic for one consumer group. Anything that can do that
//! (a Kafka client, a test double, the in-process broker below) plugs in here.

mod memory;

pub use memory::{InMemoryBroker, TopicStats};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messaging::{InboundMessage, OutboundMessage};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker is closed")]
    Closed,

    #[error("Send to topic {topic} failed: {reason}")]
    Send { topic: String, reason: String },

    #[error("Subscribe to topic {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Transport used by the publisher and the consumer loop
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Deliver a message to a topic, returning the offset it was stored at
    async fn send(&self, topic: &str, message: OutboundMessage) -> Result<u64, BrokerError>;

    /// Join `group_id` on `topic` and receive its share of the messages
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerError>;
}

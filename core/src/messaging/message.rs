//! Broker-facing message types.
//!
//! `InboundMessage` is what a consumer receives from a topic, `OutboundMessage`
//! is what a producer hands to the broker. Routing information travels in the
//! metadata map, never inside the body.

use std::collections::HashMap;

/// Well-known metadata keys
pub mod keys {
    /// Routing tag selecting the handler for a message
    pub const EVENT_TYPE: &str = "eventType";
}

/// Default topic shared by every event type
pub const DEFAULT_TOPIC: &str = "platform-events";

/// Default consumer group for the dispatcher
pub const DEFAULT_GROUP_ID: &str = "platform-group";

/// A message delivered by the broker to a consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    /// Topic the message was read from
    pub topic: String,
    /// Broker-assigned position within the topic
    pub offset: u64,
    pub body: Vec<u8>,
    /// Header values are raw bytes, as most broker clients expose them
    pub metadata: HashMap<String, Vec<u8>>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            offset: 0,
            body: body.into(),
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry and returns self for chaining.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A message handed to the broker for delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    /// Publish time in UTC milliseconds
    pub timestamp_ms: i64,
}

impl OutboundMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            metadata: HashMap::new(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Converts into the consumer-side representation at the given position.
    pub fn into_inbound(self, topic: &str, offset: u64) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            offset,
            body: self.body,
            metadata: self
                .metadata
                .into_iter()
                .map(|(k, v)| (k, v.into_bytes()))
                .collect(),
        }
    }
}

//! Extension traits giving both message directions a fluent view of the routing tag.

use std::borrow::Cow;

use super::message::{keys, InboundMessage, OutboundMessage};

/// Read access to the routing tag of a consumed message.
pub trait InboundMessageExt {
    /// Reads the `eventType` metadata entry.
    ///
    /// Header bytes are decoded lossily; an absent or empty entry yields `None`.
    fn event_type(&self) -> Option<Cow<'_, str>>;
}

/// Write access to the routing tag of a message about to be sent.
pub trait OutboundMessageExt {
    /// Sets the `eventType` metadata entry and returns self for chaining.
    fn with_event_type(self, event_type: impl Into<String>) -> Self;

    /// Reads the `eventType` metadata entry.
    fn event_type(&self) -> Option<&str>;
}

impl InboundMessageExt for InboundMessage {
    fn event_type(&self) -> Option<Cow<'_, str>> {
        self.metadata
            .get(keys::EVENT_TYPE)
            .filter(|raw| !raw.is_empty())
            .map(|raw| String::from_utf8_lossy(raw))
    }
}

impl OutboundMessageExt for OutboundMessage {
    fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.metadata
            .insert(keys::EVENT_TYPE.to_string(), event_type.into());
        self
    }

    fn event_type(&self) -> Option<&str> {
        self.metadata.get(keys::EVENT_TYPE).map(|s| s.as_str())
    }
}

//! Messaging layer: broker message types and routing-tag helpers.

pub mod message;
pub mod message_ext;

pub use message::{keys, InboundMessage, OutboundMessage, DEFAULT_GROUP_ID, DEFAULT_TOPIC};
pub use message_ext::{InboundMessageExt, OutboundMessageExt};

use thiserror::Error;

/// Startup configuration errors raised while populating the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Handler discovery already ran")]
    AlreadyRan,

    #[error("Handler declared by {origin} has an empty event type")]
    EmptyEventType { origin: String },

    #[error("Event type {event_type} is claimed by both {existing} and {incoming}")]
    Conflict {
        event_type: String,
        existing: String,
        incoming: String,
    },
}

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::descriptor::HandlerDescriptor;

/// Event type -> handler mapping shared by discovery and every dispatcher.
///
/// Holds at most one descriptor per event type. Registering a tag that is
/// already present replaces the old descriptor (last one wins) and logs a
/// warning naming both sides. Descriptors with an empty or blank event type
/// are never stored.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<HandlerDescriptor>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the descriptor it shadowed, if any
    pub fn register(&self, descriptor: HandlerDescriptor) -> Option<Arc<HandlerDescriptor>> {
        let event_type = descriptor.event_type().to_string();
        if event_type.trim().is_empty() {
            warn!(
                target: "handler_registry",
                origin = descriptor.origin(),
                "Handler with empty event type ignored"
            );
            return None;
        }
        info!(
            target: "handler_registry",
            event_type = %event_type,
            payload = descriptor.payload_shape().type_name(),
            origin = descriptor.origin(),
            "Registering handler"
        );

        let incoming_origin = descriptor.origin().to_string();
        let previous = self.handlers.insert(event_type.clone(), Arc::new(descriptor));
        if let Some(prev) = &previous {
            warn!(
                target: "handler_registry",
                event_type = %event_type,
                shadowed = prev.origin(),
                winner = %incoming_origin,
                "Handler registration conflict; previous handler replaced"
            );
        }
        previous
    }

    /// Get the handler for an event type
    pub fn lookup(&self, event_type: &str) -> Option<Arc<HandlerDescriptor>> {
        self.handlers.get(event_type).map(|h| Arc::clone(h.value()))
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

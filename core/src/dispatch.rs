// Per-message dispatch: tag -> handler -> decode -> invoke
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::handler::HandlerRegistry;
use crate::messaging::{InboundMessage, InboundMessageExt};

/// Why a message was dropped. Every variant is terminal for that message only.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Message at offset {offset} carries no eventType metadata")]
    MissingTag { offset: u64 },

    #[error("No handler registered for event type {event_type}")]
    UnregisteredHandler { event_type: String },

    #[error("Cannot decode {body_len}-byte body for {event_type} as {payload_type}: {source}")]
    Decode {
        event_type: String,
        payload_type: &'static str,
        body_len: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Handler for {event_type} failed: {reason}")]
    Invocation { event_type: String, reason: String },
}

/// Result of dispatching one message
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled { event_type: String },
    Dropped(DispatchError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            DispatchOutcome::Dropped(err) => Some(err),
            DispatchOutcome::Handled { .. } => None,
        }
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub handled: u64,
    pub missing_tag: u64,
    pub unregistered: u64,
    pub decode_failures: u64,
    pub invocation_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    handled: AtomicU64,
    missing_tag: AtomicU64,
    unregistered: AtomicU64,
    decode_failures: AtomicU64,
    invocation_failures: AtomicU64,
}

/// Routes inbound messages to registered handlers.
///
/// Cloning is cheap; clones share the registry and the counters, so several
/// consumer loops can run off the same dispatcher.
#[derive(Clone)]
pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    counters: Arc<Counters>,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Route one message to its handler and wait for the handler to finish.
    ///
    /// Never fails: every problem is logged, counted and returned as
    /// [`DispatchOutcome::Dropped`].
    #[tracing::instrument(skip(self, message), fields(topic = %message.topic, offset = message.offset))]
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        debug!(target: "dispatcher", body_len = message.body.len(), "Message received");

        match self.try_dispatch(&message).await {
            Ok(event_type) => {
                self.counters.handled.fetch_add(1, Ordering::Relaxed);
                debug!(target: "dispatcher", event_type = %event_type, "Message handled");
                DispatchOutcome::Handled { event_type }
            }
            Err(err) => {
                self.record_failure(&err);
                DispatchOutcome::Dropped(err)
            }
        }
    }

    async fn try_dispatch(&self, message: &InboundMessage) -> Result<String, DispatchError> {
        let event_type = message
            .event_type()
            .ok_or(DispatchError::MissingTag {
                offset: message.offset,
            })?
            .into_owned();

        let descriptor = self.registry.lookup(&event_type).ok_or_else(|| {
            DispatchError::UnregisteredHandler {
                event_type: event_type.clone(),
            }
        })?;

        let shape = descriptor.payload_shape();
        let payload = shape
            .decode(&message.body)
            .map_err(|source| DispatchError::Decode {
                event_type: event_type.clone(),
                payload_type: shape.type_name(),
                body_len: message.body.len(),
                source,
            })?;

        // Call inside the future so a panic while building it is caught too
        let invocation = AssertUnwindSafe(async { descriptor.invoke(payload).await })
            .catch_unwind()
            .await;
        match invocation {
            Ok(Ok(())) => Ok(event_type),
            Ok(Err(e)) => Err(DispatchError::Invocation {
                event_type,
                reason: e.to_string(),
            }),
            Err(panic) => Err(DispatchError::Invocation {
                event_type,
                reason: panic_reason(panic.as_ref()),
            }),
        }
    }

    fn record_failure(&self, err: &DispatchError) {
        match err {
            DispatchError::MissingTag { offset } => {
                self.counters.missing_tag.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dispatcher", offset, "Unroutable message dropped: no eventType metadata");
            }
            DispatchError::UnregisteredHandler { event_type } => {
                self.counters.unregistered.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dispatcher", event_type = %event_type, "No handler registered; message dropped");
            }
            DispatchError::Decode {
                event_type,
                payload_type,
                body_len,
                source,
            } => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "dispatcher",
                    event_type = %event_type,
                    payload_type,
                    body_len,
                    error = %source,
                    "Payload decode failed; message dropped"
                );
            }
            DispatchError::Invocation { event_type, reason } => {
                self.counters
                    .invocation_failures
                    .fetch_add(1, Ordering::Relaxed);
                error!(target: "dispatcher", event_type = %event_type, error = %reason, "Handler failed");
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            received: c.received.load(Ordering::Relaxed),
            handled: c.handled.load(Ordering::Relaxed),
            missing_tag: c.missing_tag.load(Ordering::Relaxed),
            unregistered: c.unregistered.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            invocation_failures: c.invocation_failures.load(Ordering::Relaxed),
        }
    }

    /// Consume messages one at a time until the stream ends or shutdown is signalled.
    pub async fn run(
        self,
        mut messages: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(target: "dispatcher", "Consumer loop started");
        if *shutdown.borrow() {
            info!(target: "dispatcher", "Consumer loop stopped before first message");
            return;
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = messages.recv() => match next {
                    Some(message) => {
                        self.dispatch(message).await;
                    }
                    None => break,
                },
            }
        }

        let stats = self.stats();
        info!(
            target: "dispatcher",
            received = stats.received,
            handled = stats.handled,
            "Consumer loop stopped"
        );
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

// Relay Core Library
// Event-type routing over a shared broker topic

pub mod api;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod messaging;
pub mod publisher;
pub mod telemetry;

// Export core types
pub use broker::{BrokerClient, BrokerError, InMemoryBroker};
pub use config::{HttpConfig, RelayConfig};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchStats, MessageDispatcher};
pub use handler::{
    ConflictPolicy, DiscoveryError, DiscoveryReport, EventController, EventHandler,
    HandlerDescriptor, HandlerDiscovery, HandlerRegistry, HandlerResult, PayloadShape,
};
pub use messaging::{InboundMessage, InboundMessageExt, OutboundMessage, OutboundMessageExt};
pub use publisher::{EventPublisher, PlatformEvent, PublishError};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, RelayError>;

/// Core runtime: registry, dispatcher and publisher around one broker
pub struct Relay {
    config: RelayConfig,
    registry: Arc<HandlerRegistry>,
    broker: Arc<dyn BrokerClient>,
    dispatcher: MessageDispatcher,
    publisher: EventPublisher,
    discovery: HandlerDiscovery,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    http_addr: Option<SocketAddr>,
}

impl Relay {
    pub fn new(config: RelayConfig, broker: Arc<dyn BrokerClient>) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry));
        let publisher = EventPublisher::new(Arc::clone(&broker), config.topic.clone());
        let discovery = HandlerDiscovery::new(config.conflict_policy);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            registry,
            broker,
            dispatcher,
            publisher,
            discovery,
            shutdown_tx,
            tasks: Vec::new(),
            http_addr: None,
        }
    }

    /// Runtime backed by an [`InMemoryBroker`]
    pub fn in_memory(config: RelayConfig) -> Self {
        let broker = Arc::new(InMemoryBroker::new(config.channel_capacity));
        Self::new(config, broker)
    }

    /// Declare a controller; its handlers are registered on `start`
    pub fn controller<C: EventController>(mut self, controller: Arc<C>) -> Self {
        self.discovery.add_controller(controller);
        self
    }

    /// Declare a stand-alone handler; registered on `start`
    pub fn handler(mut self, descriptor: HandlerDescriptor) -> Self {
        self.discovery.add_handler(descriptor);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<dyn BrokerClient> {
        &self.broker
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Address the publish API is listening on, once started
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Register all handlers, join the consumer group and start serving.
    ///
    /// The publish API address is bound first, so a bind failure leaves the
    /// runtime untouched and `start` can be retried.
    pub async fn start(&mut self) -> Result<DiscoveryReport> {
        info!("Starting Relay...");

        let listener = if self.config.http.enabled {
            let listener = TcpListener::bind(self.config.http.addr()).await?;
            let addr = listener.local_addr()?;
            Some((listener, addr))
        } else {
            None
        };

        let report = self.discovery.run(&self.registry)?;
        info!(
            target: "relay",
            event_types = ?self.registry.event_types(),
            "Handler registry populated"
        );

        let messages = self
            .broker
            .subscribe(&self.config.topic, &self.config.group_id)
            .await?;
        let consumer = self
            .dispatcher
            .clone()
            .run(messages, self.shutdown_tx.subscribe());
        self.tasks.push(tokio::spawn(consumer));
        info!(
            target: "relay",
            topic = %self.config.topic,
            group = %self.config.group_id,
            "Consumer started"
        );

        if let Some((listener, addr)) = listener {
            self.http_addr = Some(addr);
            let server = api::PublishServer::new(self.config.http.clone(), self.publisher.clone());
            let shutdown = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = server.serve_on(listener, shutdown).await {
                    error!(target: "relay", error = %e, "Publish API error");
                }
            }));
        }

        info!("Relay started successfully");
        Ok(report)
    }

    /// Stop the consumer loop and the publish API and wait for both.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down Relay...");

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(target: "relay", error = %e, "Background task ended abnormally");
            }
        }
        self.http_addr = None;

        info!("Relay shut down successfully");
        Ok(())
    }
}

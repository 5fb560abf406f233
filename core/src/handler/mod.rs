//! Handler registration: descriptors, the shared registry and startup discovery.

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod registry;

pub use descriptor::{
    BoxError, DecodedPayload, EventHandler, HandlerDescriptor, HandlerResult, PayloadShape,
};
pub use discovery::{ConflictPolicy, DiscoveryReport, EventController, HandlerDiscovery};
pub use error::DiscoveryError;
pub use registry::HandlerRegistry;

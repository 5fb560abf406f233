use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

/// Error type handlers report failures with
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler returns
pub type HandlerResult = std::result::Result<(), BoxError>;

/// A payload decoded into its concrete type, erased for storage in the registry
pub type DecodedPayload = Box<dyn Any + Send>;

/// Application logic for one payload type.
///
/// The single payload argument is the handler's only input; a component
/// that handles several event types implements this trait once per payload.
#[async_trait]
pub trait EventHandler<P>: Send + Sync + 'static
where
    P: DeserializeOwned + Send + 'static,
{
    async fn handle(&self, payload: P) -> HandlerResult;
}

/// The concrete type a handler accepts, with the decoder for it.
#[derive(Clone, Copy)]
pub struct PayloadShape {
    type_name: &'static str,
    type_id: TypeId,
    decode: fn(&[u8]) -> Result<DecodedPayload, serde_json::Error>,
}

impl PayloadShape {
    pub fn of<P>() -> Self
    where
        P: DeserializeOwned + Send + 'static,
    {
        Self {
            type_name: type_name::<P>(),
            type_id: TypeId::of::<P>(),
            decode: decode_as::<P>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<P: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<P>()
    }

    /// Parse a JSON body into this shape.
    pub fn decode(&self, body: &[u8]) -> Result<DecodedPayload, serde_json::Error> {
        (self.decode)(body)
    }
}

impl fmt::Debug for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PayloadShape").field(&self.type_name).finish()
    }
}

fn decode_as<P>(body: &[u8]) -> Result<DecodedPayload, serde_json::Error>
where
    P: DeserializeOwned + Send + 'static,
{
    let payload: P = serde_json::from_slice(body)?;
    Ok(Box::new(payload))
}

fn downcast<P: 'static>(payload: DecodedPayload) -> Result<P, BoxError> {
    payload
        .downcast::<P>()
        .map(|boxed| *boxed)
        .map_err(|_| format!("payload is not a {}", type_name::<P>()).into())
}

type Invoker = Arc<dyn Fn(DecodedPayload) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// One registered handler: routing tag, payload shape and the bound logic.
#[derive(Clone)]
pub struct HandlerDescriptor {
    event_type: String,
    payload_shape: PayloadShape,
    controller: Option<String>,
    invoker: Invoker,
}

impl HandlerDescriptor {
    /// Bind a handler instance for payload type `P` to `event_type`.
    pub fn bind<P, H>(event_type: impl Into<String>, handler: Arc<H>) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        H: EventHandler<P>,
    {
        let invoker: Invoker = Arc::new(move |payload: DecodedPayload| -> BoxFuture<'static, HandlerResult> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let payload = downcast::<P>(payload)?;
                handler.handle(payload).await
            })
        });

        Self {
            event_type: event_type.into(),
            payload_shape: PayloadShape::of::<P>(),
            controller: None,
            invoker,
        }
    }

    /// Bind a plain async function or closure to `event_type`.
    pub fn from_fn<P, F, Fut>(event_type: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let invoker: Invoker = Arc::new(move |payload: DecodedPayload| -> BoxFuture<'static, HandlerResult> {
            match downcast::<P>(payload) {
                Ok(payload) => Box::pin(f(payload)),
                Err(e) => Box::pin(async move { Err(e) }),
            }
        });

        Self {
            event_type: event_type.into(),
            payload_shape: PayloadShape::of::<P>(),
            controller: None,
            invoker,
        }
    }

    /// Record the component that declared this handler.
    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload_shape(&self) -> &PayloadShape {
        &self.payload_shape
    }

    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    /// Controller name if known, otherwise the payload type
    pub fn origin(&self) -> &str {
        self.controller
            .as_deref()
            .unwrap_or(self.payload_shape.type_name)
    }

    /// Run the handler with an already decoded payload.
    pub fn invoke(&self, payload: DecodedPayload) -> BoxFuture<'static, HandlerResult> {
        (self.invoker)(payload)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("event_type", &self.event_type)
            .field("payload_shape", &self.payload_shape)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

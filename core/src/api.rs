// Publish HTTP API
//
// POST /produce/:event_type with the raw request body as the event payload.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::HttpConfig;
use crate::publisher::{EventPublisher, PublishError};

/// Body returned when the broker accepted the event
pub const PUBLISH_OK_MESSAGE: &str = "Event published successfully";

#[derive(Clone)]
struct ApiState {
    publisher: EventPublisher,
}

/// Router exposing the publish endpoint
pub fn router(publisher: EventPublisher) -> Router {
    Router::new()
        .route("/produce/:event_type", post(produce_handler))
        .with_state(ApiState { publisher })
}

async fn produce_handler(
    State(state): State<ApiState>,
    Path(event_type): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    match state.publisher.publish(&event_type, body.to_vec()).await {
        Ok(()) => (StatusCode::OK, PUBLISH_OK_MESSAGE.to_string()),
        Err(e @ PublishError::EmptyEventType) => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            warn!(target: "publish_api", event_type = %event_type, error = %e, "Publish request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to publish event: {e}"),
            )
        }
    }
}

/// HTTP server for the publish endpoint
pub struct PublishServer {
    config: HttpConfig,
    publisher: EventPublisher,
}

impl PublishServer {
    pub fn new(config: HttpConfig, publisher: EventPublisher) -> Self {
        Self { config, publisher }
    }

    /// Bind the configured address and serve until `shutdown` turns true
    pub async fn serve(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let local = listener.local_addr()?;
        info!(
            target: "publish_api",
            url = %format!("http://{}", local),
            topic = %self.publisher.topic(),
            "Publish API ready"
        );

        axum::serve(listener, router(self.publisher))
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        info!(target: "publish_api", "Publish API stopped");
        Ok(())
    }
}

mod events;
mod handlers;

use std::sync::Arc;

use handlers::OrderEventHandlers;
use relay_core::{telemetry, Relay, RelayConfig};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    telemetry::init_tracing(Some("info,relay_core=info,order_service=info"))?;

    // Defaults + env + optional TOML overlay
    let cfg = RelayConfig::load();
    info!(
        target: "order_service",
        topic = %cfg.topic,
        group = %cfg.group_id,
        "Starting order service"
    );

    let orders = Arc::new(OrderEventHandlers::default());
    let mut relay = Relay::in_memory(cfg).controller(Arc::clone(&orders));
    let report = relay.start().await?;
    info!(
        target: "order_service",
        controllers = ?report.controllers,
        registered = ?report.registered,
        "Handlers registered"
    );
    if let Some(addr) = relay.http_addr() {
        info!(
            target: "order_service",
            "Publish with: curl -X POST http://{}/produce/ORDER_CREATED -d '{{\"orderId\":\"abc123\",\"amount\":42.5}}'",
            addr
        );
    }

    signal::ctrl_c().await?;
    info!(target: "order_service", "Ctrl-C received");

    relay.shutdown().await?;
    let stats = relay.dispatcher().stats();
    info!(
        target: "order_service",
        created = orders.created_count(),
        cancelled = orders.cancelled_count(),
        received = stats.received,
        handled = stats.handled,
        "Order service stopped"
    );
    Ok(())
}

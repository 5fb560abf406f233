use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{EventController, EventHandler, HandlerDescriptor, HandlerResult};
use tracing::info;

use crate::events::{OrderCancelledEvent, OrderCreatedEvent, ORDER_CANCELLED, ORDER_CREATED};

/// Order lifecycle handlers
#[derive(Default)]
pub struct OrderEventHandlers {
    created: AtomicU64,
    cancelled: AtomicU64,
}

impl OrderEventHandlers {
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn cancelled_count(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl EventController for OrderEventHandlers {
    fn name(&self) -> &str {
        "OrderEventHandlers"
    }

    fn handlers(self: Arc<Self>) -> Vec<HandlerDescriptor> {
        vec![
            HandlerDescriptor::bind::<OrderCreatedEvent, _>(ORDER_CREATED, Arc::clone(&self)),
            HandlerDescriptor::bind::<OrderCancelledEvent, _>(ORDER_CANCELLED, self),
        ]
    }
}

#[async_trait]
impl EventHandler<OrderCreatedEvent> for OrderEventHandlers {
    async fn handle(&self, event: OrderCreatedEvent) -> HandlerResult {
        if !event.amount.is_finite() || event.amount < 0.0 {
            return Err(format!("order {} has invalid amount {}", event.order_id, event.amount).into());
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        info!(target: "order_service", order_id = %event.order_id, amount = event.amount, "Order received");
        Ok(())
    }
}

#[async_trait]
impl EventHandler<OrderCancelledEvent> for OrderEventHandlers {
    async fn handle(&self, event: OrderCancelledEvent) -> HandlerResult {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "order_service",
            order_id = %event.order_id,
            reason = event.reason.as_deref().unwrap_or("unspecified"),
            "Order cancelled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{HandlerDiscovery, HandlerRegistry};

    #[tokio::test]
    async fn controller_registers_both_order_events() {
        let orders = Arc::new(OrderEventHandlers::default());
        let registry = HandlerRegistry::new();
        HandlerDiscovery::default()
            .controller(Arc::clone(&orders))
            .run(&registry)
            .unwrap();

        assert_eq!(registry.event_types(), vec![ORDER_CANCELLED, ORDER_CREATED]);

        let created = registry.lookup(ORDER_CREATED).unwrap();
        let payload = created
            .payload_shape()
            .decode(br#"{"orderId":"abc123","amount":42.5}"#)
            .unwrap();
        created.invoke(payload).await.unwrap();
        assert_eq!(orders.created_count(), 1);
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let orders = OrderEventHandlers::default();
        let result = EventHandler::<OrderCreatedEvent>::handle(
            &orders,
            OrderCreatedEvent {
                order_id: "o-1".into(),
                amount: -1.0,
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(orders.created_count(), 0);
    }
}

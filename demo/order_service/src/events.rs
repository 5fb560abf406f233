use relay_core::PlatformEvent;
use serde::{Deserialize, Serialize};

pub const ORDER_CREATED: &str = "ORDER_CREATED";
pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: String,
    pub amount: f64,
}

impl PlatformEvent for OrderCreatedEvent {
    fn event_type(&self) -> &str {
        ORDER_CREATED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledEvent {
    pub order_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PlatformEvent for OrderCancelledEvent {
    fn event_type(&self) -> &str {
        ORDER_CANCELLED
    }
}

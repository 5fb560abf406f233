use relay_core::messaging::keys;
use relay_core::{
    DispatchError, DispatchOutcome, HandlerDescriptor, HandlerRegistry, HandlerResult,
    InboundMessage, MessageDispatcher,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreated {
    order_id: String,
    amount: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentFailed {
    order_id: String,
}

// Helper to create a tagged message
fn make_message(event_type: &str, body: &str) -> InboundMessage {
    InboundMessage::new("platform-events", body.as_bytes().to_vec())
        .with_metadata(keys::EVENT_TYPE, event_type.as_bytes().to_vec())
}

/// Registry with an ORDER_CREATED handler that forwards payloads to a channel
fn order_dispatcher() -> (MessageDispatcher, mpsc::UnboundedReceiver<OrderCreated>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(HandlerDescriptor::from_fn(
        "ORDER_CREATED",
        move |event: OrderCreated| {
            let tx = tx.clone();
            async move {
                let sent: HandlerResult = tx.send(event).map_err(|e| e.into());
                sent
            }
        },
    ));
    (MessageDispatcher::new(registry), rx)
}

#[tokio::test]
async fn routes_to_registered_handler_with_decoded_payload() {
    let (dispatcher, mut rx) = order_dispatcher();

    let outcome = dispatcher
        .dispatch(make_message(
            "ORDER_CREATED",
            r#"{"orderId":"abc123","amount":42.5}"#,
        ))
        .await;

    assert!(outcome.is_handled());
    let received = rx.try_recv().expect("handler should have run");
    assert_eq!(
        received,
        OrderCreated {
            order_id: "abc123".into(),
            amount: 42.5,
        }
    );
    assert!(rx.try_recv().is_err(), "handler must run exactly once");
}

#[tokio::test]
async fn unknown_tag_invokes_nothing() {
    let (dispatcher, mut rx) = order_dispatcher();

    let outcome = dispatcher.dispatch(make_message("UNKNOWN", "{}")).await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Dropped(DispatchError::UnregisteredHandler { ref event_type })
            if event_type == "UNKNOWN"
    ));
    assert!(rx.try_recv().is_err());
    assert_eq!(dispatcher.stats().unregistered, 1);
}

#[tokio::test]
async fn missing_tag_invokes_nothing() {
    let (dispatcher, mut rx) = order_dispatcher();

    let message = InboundMessage::new(
        "platform-events",
        br#"{"orderId":"abc123","amount":1.0}"#.to_vec(),
    );
    let outcome = dispatcher.dispatch(message).await;

    assert!(matches!(
        outcome.error(),
        Some(DispatchError::MissingTag { .. })
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn tag_inside_body_is_ignored() {
    let (dispatcher, mut rx) = order_dispatcher();

    let message = InboundMessage::new(
        "platform-events",
        br#"{"eventType":"ORDER_CREATED","orderId":"x","amount":1.0}"#.to_vec(),
    );
    assert!(!dispatcher.dispatch(message).await.is_handled());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn shape_mismatch_is_a_decode_error() {
    let (dispatcher, mut rx) = order_dispatcher();

    let outcome = dispatcher
        .dispatch(make_message("ORDER_CREATED", r#"{"orderId":7}"#))
        .await;

    match outcome {
        DispatchOutcome::Dropped(DispatchError::Decode {
            event_type,
            body_len,
            ..
        }) => {
            assert_eq!(event_type, "ORDER_CREATED");
            assert_eq!(body_len, r#"{"orderId":7}"#.len());
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(dispatcher.stats().decode_failures, 1);
}

#[tokio::test]
async fn failing_handler_does_not_affect_next_message() {
    let (dispatcher, mut rx) = order_dispatcher();
    dispatcher
        .registry()
        .register(HandlerDescriptor::from_fn(
            "PAYMENT_FAILED",
            |event: PaymentFailed| async move {
                let failed: HandlerResult = Err(format!("cannot refund {}", event.order_id).into());
                failed
            },
        ));

    let first = dispatcher
        .dispatch(make_message("PAYMENT_FAILED", r#"{"orderId":"o-1"}"#))
        .await;
    match first.error() {
        Some(DispatchError::Invocation { event_type, reason }) => {
            assert_eq!(event_type, "PAYMENT_FAILED");
            assert!(reason.contains("cannot refund o-1"));
        }
        other => panic!("expected invocation error, got {other:?}"),
    }

    let second = dispatcher
        .dispatch(make_message(
            "ORDER_CREATED",
            r#"{"orderId":"o-2","amount":10.0}"#,
        ))
        .await;
    assert!(second.is_handled());
    assert_eq!(rx.try_recv().unwrap().order_id, "o-2");

    let stats = dispatcher.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.invocation_failures, 1);
}

#[tokio::test]
async fn consumer_loop_processes_until_stream_ends() {
    let (dispatcher, mut rx) = order_dispatcher();
    let (msg_tx, msg_rx) = mpsc::channel(8);
    let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let loop_dispatcher = dispatcher.clone();
    let handle = tokio::spawn(loop_dispatcher.run(msg_rx, stop_rx));

    msg_tx.send(make_message("UNKNOWN", "{}")).await.unwrap();
    msg_tx
        .send(make_message("ORDER_CREATED", "not json"))
        .await
        .unwrap();
    msg_tx
        .send(make_message(
            "ORDER_CREATED",
            r#"{"orderId":"last","amount":3.0}"#,
        ))
        .await
        .unwrap();
    drop(msg_tx);

    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timeout")
        .expect("consumer loop panicked");

    assert_eq!(rx.recv().await.unwrap().order_id, "last");
    let stats = dispatcher.stats();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.handled, 1);
}

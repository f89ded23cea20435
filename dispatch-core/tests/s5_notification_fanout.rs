//! A real WebSocket client subscribes over the reactor's public socket, a block carrying
//! a matching event is pushed through a `BlockProcessorPool`, and the subscriber receives
//! it; after the client disconnects, `force_delete` removes it from the registry so a
//! second push finds nobody left to notify.

mod common;

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::notification::fanout::{BlockEvent, BlockItem, BlockProcessorPool};
use dispatch_core::notification::protocol::NotificationProtocol;
use dispatch_core::notification::subscriber::SubscriberRegistry;
use dispatch_core::queue::BoundedQueue;
use dispatch_core::Router;
use tungstenite::Message;

#[test]
fn subscriber_receives_a_matching_block_event_then_is_force_deleted_on_disconnect() {
    let registry = Arc::new(SubscriberRegistry::new());
    let notification = Arc::new(NotificationProtocol::new(Arc::clone(&registry)));

    let router = Arc::new(Router::new(vec![]));
    let reactor = common::spawn_reactor(common::test_config(), router, notification);
    let addr = reactor.addrs["public_web"];

    let queue = BoundedQueue::unbounded();
    let pool = BlockProcessorPool::spawn(1, queue.clone(), Arc::clone(&registry));

    let url = format!("ws://{addr}/");
    let (mut socket, _response) = tungstenite::connect(&url).expect("websocket handshake failed");
    socket
        .send(Message::text(serde_json::json!({"addr": "A1", "nonce": "n"}).to_string()))
        .unwrap();

    // Give the reader thread on the server side a moment to apply the subscribe.
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while registry.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(registry.len(), 1, "subscribe message should have registered one subscriber");

    queue
        .add(BlockItem {
            height: 1,
            events: vec![BlockEvent {
                address: "A1".to_string(),
                kind: "post".to_string(),
                payload: serde_json::json!({"id": 7}),
            }],
        })
        .map_err(|_| "queue full")
        .unwrap();

    let received = loop {
        match socket.read() {
            Ok(Message::Text(text)) => break text,
            Ok(_) => continue,
            Err(e) => panic!("expected a text frame, got error: {e}"),
        }
    };
    let event: serde_json::Value = serde_json::from_str(&received).unwrap();
    assert_eq!(event["address"], "A1");
    assert_eq!(event["kind"], "post");
    assert_eq!(event["payload"]["id"], 7);

    socket.close(None).ok();
    drop(socket);

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while !registry.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(registry.is_empty(), "closed connection should have been force-deleted from the registry");

    pool.stop();
    reactor.shutdown();
}

//! Private socket: loopback with valid Basic Auth gets through; the non-loopback half
//! of this scenario can't be driven from a real socket (a test can't spoof its own
//! source IP), so it's covered instead by `reactor::acl`'s unit tests
//! (`non_loopback_rejected_without_matching_cidr`, `matching_cidr_allows_peer`).

mod common;

use std::sync::Arc;

use dispatch_core::handler::{CommandTableHandler, Handler};
use dispatch_core::notification::protocol::NotificationProtocol;
use dispatch_core::notification::subscriber::SubscriberRegistry;
use dispatch_core::worker::FnResourceFactory;
use dispatch_core::{RequestPodBuilder, Router};

#[test]
fn loopback_with_valid_credentials_reaches_the_handler() {
    let mut table = CommandTableHandler::new();
    table.register("ping", Arc::new(|_params, _res| Ok(serde_json::json!("pong"))));
    let handler: Arc<dyn Handler> = Arc::new(table);

    let pod = RequestPodBuilder::new("rpc").route("/", true, handler).thread_count(1).build();
    pod.start(Arc::new(FnResourceFactory::new(|| ())));
    let router = Arc::new(Router::new(vec![pod]));

    let notification = Arc::new(NotificationProtocol::new(Arc::new(SubscriberRegistry::new())));
    let reactor = common::spawn_reactor(common::test_config(), Arc::clone(&router), notification);
    let addr = reactor.addrs["private_rpc"];

    let auth = common::basic_auth_header("node", "s3cret");
    let response = common::http_request(
        addr,
        "POST",
        "/",
        &[("Authorization", auth.as_str())],
        br#"{"id":1,"method":"ping"}"#,
    );

    router.interrupt_all();
    router.stop_all();
    reactor.shutdown();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["result"], "pong");
}

#[test]
fn loopback_with_missing_credentials_is_rejected_with_401() {
    let pod = RequestPodBuilder::new("rpc").build();
    pod.start(Arc::new(FnResourceFactory::new(|| ())));
    let router = Arc::new(Router::new(vec![pod]));

    let notification = Arc::new(NotificationProtocol::new(Arc::new(SubscriberRegistry::new())));
    let reactor = common::spawn_reactor(common::test_config(), Arc::clone(&router), notification);
    let addr = reactor.addrs["private_rpc"];

    let response = common::http_request(addr, "POST", "/", &[], b"{}");

    router.interrupt_all();
    router.stop_all();
    reactor.shutdown();

    assert_eq!(response.status, 401);
}

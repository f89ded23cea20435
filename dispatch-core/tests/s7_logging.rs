//! Dispatching a request runs inside an already-instrumented codebase: starting a pod
//! logs `worker started` for each thread it spins up, and the reactor logs `listening`
//! for each socket it binds. `tracing-test` captures these without needing a real
//! subscriber wired up by the test itself.

mod common;

use std::sync::Arc;

use dispatch_core::handler::{Handler, StaticHandler};
use dispatch_core::notification::protocol::NotificationProtocol;
use dispatch_core::notification::subscriber::SubscriberRegistry;
use dispatch_core::worker::FnResourceFactory;
use dispatch_core::{RequestPodBuilder, Router};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn dispatching_a_request_emits_worker_and_listener_spans() {
    let handler: Arc<dyn Handler> = Arc::new(StaticHandler::new(|_p, _m, _h, _b, reply, _r| {
        reply.write_reply(200, b"ok".to_vec());
    }));
    let pod = RequestPodBuilder::new("rest").route("/", false, handler).thread_count(1).build();
    pod.start(Arc::new(FnResourceFactory::new(|| ())));
    let router = Arc::new(Router::new(vec![pod]));

    let notification = Arc::new(NotificationProtocol::new(Arc::new(SubscriberRegistry::new())));
    let reactor = common::spawn_reactor(common::test_config(), Arc::clone(&router), notification);
    let addr = reactor.addrs["public_web"];

    let response = common::http_request(addr, "GET", "/", &[], b"");

    router.interrupt_all();
    router.stop_all();
    reactor.shutdown();

    assert_eq!(response.status, 200);
    assert!(logs_contain("worker started"), "starting a pod should log each worker thread coming up");
    assert!(logs_contain("listening"), "binding a socket should log which address it's listening on");
}

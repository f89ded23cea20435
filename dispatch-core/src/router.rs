//! The router holds an ordered set of pods and hands each request to the first one that
//! claims it. Distinct pods exist to partition workloads with different depth/thread
//! tunings — private RPC, public web GET-like, public web POST, static assets, REST.

use crate::pod::{PodOutcome, RequestPod};
use crate::request::Request;

pub enum RouteOutcome {
    /// A pod claimed and enqueued the request.
    Enqueued,
    /// A pod matched but its queue was full — reply 503.
    QueueFull,
    /// No pod claimed the request — reply 404.
    NoRoute,
}

pub struct Router {
    pods: Vec<RequestPod>,
}

impl Router {
    pub fn new(pods: Vec<RequestPod>) -> Router {
        Router { pods }
    }

    pub fn pods(&self) -> &[RequestPod] {
        &self.pods
    }

    /// Hands the request to each pod in order. A pod that doesn't claim it hands it
    /// straight back (`Err(request)`), so it moves on to the next pod; a pod that claims
    /// it either enqueues the work item or has already replied 503 itself. If no pod
    /// claims the request at all, the router replies 404 directly — the request is never
    /// left to fall through to the generic Drop-based 500.
    pub fn process(&self, mut request: Request) -> RouteOutcome {
        for pod in &self.pods {
            match pod.process(request) {
                Ok(PodOutcome::Enqueued) => return RouteOutcome::Enqueued,
                Ok(PodOutcome::QueueFull) => return RouteOutcome::QueueFull,
                Err(handed_back) => request = handed_back,
            }
        }
        request
            .reply_gateway()
            .write_reply(404, b"Not Found".to_vec());
        RouteOutcome::NoRoute
    }

    pub fn interrupt_all(&self) {
        for pod in &self.pods {
            pod.interrupt();
        }
    }

    pub fn stop_all(&self) {
        for pod in &self.pods {
            pod.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, StaticHandler};
    use crate::pod::RequestPodBuilder;
    use crate::reactor::trigger::{ConnectionId, ReactorHandle};
    use crate::request::Method;
    use crate::worker::FnResourceFactory;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dummy_reactor() -> (ReactorHandle, crossbeam_channel::Receiver<crate::reactor::trigger::ReplyEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let poll = mio::Poll::new().unwrap();
        let waker = Arc::new(mio::Waker::new(poll.registry(), mio::Token(0)).unwrap());
        (ReactorHandle::new(tx, waker), rx)
    }

    fn make_request(uri: &str, reactor: ReactorHandle) -> Request {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1234);
        Request::new(Method::Get, uri.to_string(), vec![], vec![], addr, false, reactor, ConnectionId(1))
    }

    #[test]
    fn falls_through_unmatched_pods_to_a_later_match() {
        let (reactor, rx) = dummy_reactor();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let handler: Arc<dyn Handler> = Arc::new(StaticHandler::new(move |_p, _m, _h, _b, reply, _r| {
            hits2.fetch_add(1, Ordering::SeqCst);
            reply.write_reply(200, vec![]);
        }));

        let empty_pod = RequestPodBuilder::new("empty").build();
        let matching_pod = RequestPodBuilder::new("rest").route("/rest/", false, handler).build();
        empty_pod.start(Arc::new(FnResourceFactory::new(|| ())));
        matching_pod.start(Arc::new(FnResourceFactory::new(|| ())));

        let router = Router::new(vec![empty_pod, matching_pod]);
        let outcome = router.process(make_request("/rest/thing", reactor));
        assert!(matches!(outcome, RouteOutcome::Enqueued));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
        while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        router.stop_all();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn no_route_replies_404_instead_of_dropping_to_500() {
        let (reactor, rx) = dummy_reactor();
        let pod = RequestPodBuilder::new("empty").build();
        pod.start(Arc::new(FnResourceFactory::new(|| ())));
        let router = Router::new(vec![pod]);

        let outcome = router.process(make_request("/nothing/matches", reactor));
        router.stop_all();

        assert!(matches!(outcome, RouteOutcome::NoRoute));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, 404);
    }
}

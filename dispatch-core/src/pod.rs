//! A pod is one `(queue + worker pool + ordered prefix→handler table)`. It matches an
//! incoming request against its ordered entries, first-match-wins, and enqueues a work
//! item — or reports that nothing matched so the router can try the next pod.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::handler::Handler;
use crate::queue::BoundedQueue;
use crate::request::{Request, WorkItem};
use crate::worker::{WorkerPool, WorkerResourceFactory};

struct RouteEntry {
    prefix: String,
    exact: bool,
    handler: Arc<dyn Handler>,
}

/// Outcome of trying to match and enqueue a request against a pod whose route table
/// claimed it. A pod that finds no match hands the `Request` back to the caller (see
/// [`RequestPod::process`]) rather than reporting an outcome, so the router can try the
/// next pod without ever dropping a request it hasn't actually routed.
pub enum PodOutcome {
    /// An entry matched and the work item was enqueued.
    Enqueued,
    /// An entry matched but the bounded queue was full; the pod has already replied 503
    /// on the caller's behalf.
    QueueFull,
}

pub struct RequestPod {
    name: String,
    routes: Vec<RouteEntry>,
    queue: BoundedQueue<WorkItem>,
    max_depth: Option<usize>,
    thread_count: usize,
    started: AtomicBool,
    pool: Mutex<Option<WorkerPool>>,
}

pub struct RequestPodBuilder {
    name: String,
    routes: Vec<RouteEntry>,
    max_depth: Option<usize>,
    thread_count: usize,
}

impl RequestPodBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        RequestPodBuilder {
            name: name.into(),
            routes: Vec::new(),
            max_depth: None,
            thread_count: 1,
        }
    }

    /// Entries are matched in the order they're added — first match wins, so more
    /// specific prefixes must be registered before more general ones if both could
    /// otherwise apply to the same URI.
    pub fn route(mut self, prefix: impl Into<String>, exact: bool, handler: Arc<dyn Handler>) -> Self {
        self.routes.push(RouteEntry {
            prefix: prefix.into(),
            exact,
            handler,
        });
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    pub fn build(self) -> RequestPod {
        RequestPod {
            name: self.name,
            routes: self.routes,
            queue: BoundedQueue::new(self.max_depth),
            max_depth: self.max_depth,
            thread_count: self.thread_count,
            started: AtomicBool::new(false),
            pool: Mutex::new(None),
        }
    }
}

impl RequestPod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    fn find_match<'a>(&'a self, uri: &str) -> Option<&'a RouteEntry> {
        self.routes.iter().find(|entry| {
            if entry.exact {
                uri == entry.prefix
            } else {
                uri.starts_with(entry.prefix.as_str())
            }
        })
    }

    /// Scans the ordered route list. On no match, hands `request` straight back so the
    /// router can try the next pod — this pod never takes ownership of a request it
    /// doesn't claim. On a match, builds a work item and attempts to enqueue it; if the
    /// queue is full the pod replies 503 itself (via the item's gateway, before the item
    /// and its `Request` drop) so that explicit reply wins over the generic Drop
    /// fallback.
    pub fn process(&self, request: Request) -> Result<PodOutcome, Request> {
        let uri = request.uri().to_string();
        let Some(entry) = self.find_match(&uri) else {
            return Err(request);
        };

        let path_tail = if entry.exact {
            String::new()
        } else {
            uri[entry.prefix.len()..].to_string()
        };
        let handler = Arc::clone(&entry.handler);
        let item = WorkItem::new(request, path_tail, handler);

        match self.queue.add(item) {
            Ok(()) => Ok(PodOutcome::Enqueued),
            Err(item) => {
                item.reply_gateway.write_reply(503, b"Service Unavailable: queue full".to_vec());
                Ok(PodOutcome::QueueFull)
            }
        }
    }

    /// Idempotent-guarded: a second call is a no-op.
    pub fn start<R>(&self, resource_factory: Arc<R>)
    where
        R: WorkerResourceFactory + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let pool = WorkerPool::spawn(&self.name, self.thread_count, self.queue.clone(), resource_factory);
        *self.pool.lock().unwrap() = Some(pool);
    }

    pub fn interrupt(&self) {
        if let Some(pool) = self.pool.lock().unwrap().as_ref() {
            pool.interrupt();
        }
    }

    /// Interrupts then joins every worker, then drops the queue. Pods are not
    /// restartable: `start()` after `stop()` will not spawn new workers because
    /// `started` stays true.
    pub fn stop(&self) {
        if let Some(pool) = self.pool.lock().unwrap().take() {
            pool.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::StaticHandler;
    use crate::reactor::trigger::{ConnectionId, ReactorHandle};
    use crate::request::Method;
    use crate::worker::FnResourceFactory;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn dummy_reactor_handle() -> ReactorHandle {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let poll = mio::Poll::new().unwrap();
        let waker = Arc::new(mio::Waker::new(poll.registry(), mio::Token(0)).unwrap());
        ReactorHandle::new(tx, waker)
    }

    fn make_request(uri: &str, reactor: ReactorHandle, id: u64) -> Request {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1234);
        Request::new(Method::Get, uri.to_string(), vec![], vec![], addr, false, reactor, ConnectionId(id))
    }

    #[test]
    fn first_match_wins_in_insertion_order() {
        let reactor = dummy_reactor_handle();
        let a_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let b_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let a_hits2 = Arc::clone(&a_hits);
        let b_hits2 = Arc::clone(&b_hits);

        let handler_a: Arc<dyn Handler> = Arc::new(StaticHandler::new(
            move |_p, _m, _h, _b, reply, _r| {
                a_hits2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                reply.write_reply(200, vec![]);
            },
        ));
        let handler_b: Arc<dyn Handler> = Arc::new(StaticHandler::new(
            move |_p, _m, _h, _b, reply, _r| {
                b_hits2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                reply.write_reply(200, vec![]);
            },
        ));

        let pod = RequestPodBuilder::new("test")
            .route("/", false, handler_a)
            .route("/post/", false, handler_b)
            .build();

        pod.start(Arc::new(FnResourceFactory::new(|| ())));
        let req = make_request("/post/x", reactor, 1);
        assert!(matches!(pod.process(req), Ok(PodOutcome::Enqueued)));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
        while a_hits.load(std::sync::atomic::Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        pod.stop();

        assert_eq!(a_hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn no_match_hands_request_back() {
        let reactor = dummy_reactor_handle();
        let pod: RequestPod = RequestPodBuilder::new("empty").build();
        let req = make_request("/anything", reactor, 1);
        let returned = pod.process(req);
        assert!(returned.is_err());
        assert_eq!(returned.err().unwrap().uri(), "/anything");
    }

    #[test]
    fn queue_full_reports_queue_full_not_no_match() {
        let reactor = dummy_reactor_handle();
        let handler: Arc<dyn Handler> = Arc::new(StaticHandler::new(
            move |_p, _m, _h, _b, _reply, _r| {
                std::thread::sleep(std::time::Duration::from_millis(200));
            },
        ));
        let pod = RequestPodBuilder::new("backpressure")
            .route("/", false, handler)
            .max_depth(1)
            .thread_count(1)
            .build();
        pod.start(Arc::new(FnResourceFactory::new(|| ())));

        let req1 = make_request("/a", reactor.clone(), 1);
        let req2 = make_request("/b", reactor.clone(), 2);
        let req3 = make_request("/c", reactor.clone(), 3);

        // req1 is picked up by the lone worker almost immediately, freeing the queue
        // slot for req2.
        assert!(matches!(pod.process(req1), Ok(PodOutcome::Enqueued)));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(matches!(pod.process(req2), Ok(PodOutcome::Enqueued)));
        let outcome3 = pod.process(req3);
        pod.stop();
        assert!(matches!(outcome3, Ok(PodOutcome::QueueFull)));
    }
}

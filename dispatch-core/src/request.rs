//! The request/reply data model: [`Request`] is immutable after construction and is
//! replied to exactly once — either by a handler through [`ReplyGateway`], or by
//! [`Request`]'s own `Drop` impl, which emits a 500 to prevent request leaks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use crate::reactor::trigger::{ConnectionId, ReactorHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Head,
    Options,
    Delete,
    Unknown,
}

impl Method {
    pub fn from_str(s: &str) -> Method {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "DELETE" => Method::Delete,
            _ => Method::Unknown,
        }
    }
}

/// The body captured from the wire, a credential extracted from the `Authorization`
/// header, and the response the reactor will eventually write back.
struct Inner {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Mutex<Option<Vec<u8>>>,
    peer_addr: SocketAddr,
    created_at: Instant,
    replied: AtomicBool,
    reply_headers: Mutex<Vec<(String, String)>>,
    reactor: ReactorHandle,
    connection_id: ConnectionId,
    /// Set by the reactor for sockets that bypass the ACL (public ports).
    public_access: bool,
    shutting_down: AtomicBool,
}

/// One accepted HTTP request, owned by the worker between enqueue and reply.
pub struct Request {
    inner: Arc<Inner>,
}

impl Request {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: Method,
        uri: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        peer_addr: SocketAddr,
        public_access: bool,
        reactor: ReactorHandle,
        connection_id: ConnectionId,
    ) -> Request {
        Request {
            inner: Arc::new(Inner {
                method,
                uri,
                headers,
                body: Mutex::new(Some(body)),
                peer_addr,
                created_at: Instant::now(),
                replied: AtomicBool::new(false),
                reply_headers: Mutex::new(Vec::new()),
                reactor,
                connection_id,
                public_access,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.headers
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    pub fn public_access(&self) -> bool {
        self.inner.public_access
    }

    /// Reads the body exactly once; subsequent calls return an empty vector, matching
    /// the "body is consumable once" contract.
    pub fn take_body(&self) -> Vec<u8> {
        self.inner.body.lock().unwrap().take().unwrap_or_default()
    }

    pub fn read_auth_credentials(&self) -> Option<(String, String)> {
        let header = self.header("Authorization")?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, pass) = text.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }

    /// A gateway capability for whichever worker ends up owning this request.
    pub fn reply_gateway(&self) -> ReplyGateway {
        ReplyGateway {
            request: Arc::downgrade(&self.inner),
        }
    }

    pub fn mark_shutting_down(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
    }

    fn send_reply(inner: &Arc<Inner>, status: u16, body: Vec<u8>) {
        if inner.shutting_down.load(Ordering::SeqCst) {
            inner
                .reply_headers
                .lock()
                .unwrap()
                .push(("Connection".to_string(), "close".to_string()));
        }
        let headers = inner.reply_headers.lock().unwrap().clone();
        inner
            .reactor
            .send_response(inner.connection_id, status, headers, body);
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        // Only the last owner runs this — if a handler already replied, `replied` is
        // already true and this is a no-op. Otherwise this is the fallback described in
        // invariant 1: every accepted request gets exactly one reply.
        if !self.inner.replied.swap(true, Ordering::SeqCst) {
            Request::send_reply(
                &self.inner,
                500,
                b"Internal Server Error: Unhandled request".to_vec(),
            );
        }
    }
}

/// Worker-side capability: `write_reply` is legal exactly once per request.
pub struct ReplyGateway {
    request: Weak<Inner>,
}

impl ReplyGateway {
    pub fn write_header(&self, key: &str, value: &str) {
        if let Some(inner) = self.request.upgrade() {
            inner
                .reply_headers
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
        }
    }

    pub fn read_auth_credentials(&self) -> Option<(String, String)> {
        let inner = self.request.upgrade()?;
        let header = inner
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Authorization"))
            .map(|(_, v)| v.clone())?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, pass) = text.split_once(':')?;
        Some((user.to_string(), pass.to_string()))
    }

    /// At-most-once. A debug build asserts on a second call; a release build ignores it,
    /// matching the "reply attempted twice" recovery policy in the error design.
    pub fn write_reply(&self, status: u16, body: Vec<u8>) {
        let Some(inner) = self.request.upgrade() else {
            // The request is already gone — its destructor already ran the fallback.
            return;
        };
        let already = inner.replied.swap(true, Ordering::SeqCst);
        debug_assert!(!already, "write_reply called twice for the same request");
        if already {
            return;
        }
        Request::send_reply(&inner, status, body);
    }
}

/// `(path_tail, body, reply_gateway, handler)` — produced by a pod when it claims a
/// request, consumed by a worker thread.
///
/// Holds the [`Request`] itself (not just the gateway) so the request stays alive for
/// the whole time it is "owned by the worker": if the handler never calls
/// `write_reply`, dropping the `WorkItem` at the end of the worker loop drops the last
/// `Request` handle and its fallback 500 fires.
pub struct WorkItem {
    pub path_tail: String,
    pub body: Vec<u8>,
    pub reply_gateway: ReplyGateway,
    pub handler: Arc<dyn crate::handler::Handler>,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    request: Request,
}

impl WorkItem {
    pub fn new(request: Request, path_tail: String, handler: Arc<dyn crate::handler::Handler>) -> WorkItem {
        let body = request.take_body();
        let method = request.method();
        let headers = request.headers().to_vec();
        let reply_gateway = request.reply_gateway();
        WorkItem {
            path_tail,
            body,
            reply_gateway,
            handler,
            method,
            headers,
            request,
        }
    }
}

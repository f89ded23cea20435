//! The reactor is the single thread that owns every socket. It accepts connections,
//! parses HTTP off them with [`http::ConnectionBuffer`], applies the ACL/CORS/method
//! gates, and hands parsed requests to the [`crate::router::Router`]. Workers never
//! touch a socket: replies come back exclusively through the [`trigger::ReactorHandle`]
//! channel, drained here after the `mio::Waker` interrupts `poll()`.

pub mod acl;
pub mod auth;
pub mod http;
pub mod tls;
pub mod trigger;

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::{DispatchConfig, SocketConfig};
use crate::error::ReactorError;
use crate::notification::protocol::NotificationProtocol;
use crate::reactor::acl::Acl;
use crate::reactor::auth::BasicAuthVerifier;
use crate::reactor::http::{ConnectionBuffer, ParseOutcome};
use crate::reactor::tls::TlsContext;
use crate::reactor::trigger::{ConnectionId, ReactorHandle, ReplyEvent};
use crate::request::Request;
use crate::router::Router;
use crate::ws::WebSocketConnection;

const WAKE_TOKEN: Token = Token(0);
const LISTENER_TOKEN_BASE: usize = 1;
const CONNECTION_TOKEN_BASE: usize = 1_000;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    PrivateRpc,
    PublicWeb,
    PublicWebTls,
    StaticAssets,
    Rest,
}

impl SocketKind {
    fn requires_auth(self) -> bool {
        matches!(self, SocketKind::PrivateRpc)
    }

    fn is_tls(self) -> bool {
        matches!(self, SocketKind::PublicWebTls)
    }

    fn name(self) -> &'static str {
        match self {
            SocketKind::PrivateRpc => "private_rpc",
            SocketKind::PublicWeb => "public_web",
            SocketKind::PublicWebTls => "public_web_tls",
            SocketKind::StaticAssets => "static_assets",
            SocketKind::Rest => "rest",
        }
    }
}

struct Listener {
    listener: TcpListener,
    kind: SocketKind,
    public_access: bool,
}

enum Transport {
    Plain(TcpStream),
    Tls(TcpStream, Box<rustls::ServerConnection>),
}

struct Connection {
    transport: Transport,
    kind: SocketKind,
    public_access: bool,
    peer_addr: SocketAddr,
    buffer: ConnectionBuffer,
    write_queue: Vec<u8>,
    last_activity: Instant,
}

/// Owns every listening socket plus the live connection table. Constructed once from
/// [`DispatchConfig`], run on its own thread via [`Reactor::run`].
pub struct Reactor {
    poll: Poll,
    listeners: HashMap<Token, Listener>,
    connections: HashMap<Token, Connection>,
    ws_sessions: HashMap<Token, Arc<WebSocketConnection>>,
    next_connection_token: usize,
    router: Arc<Router>,
    acl: Acl,
    auth: BasicAuthVerifier,
    tls_context: Option<TlsContext>,
    handle: ReactorHandle,
    reply_rx: crossbeam_channel::Receiver<ReplyEvent>,
    accepting: Arc<AtomicBool>,
    shutting_down: bool,
    header_limit: usize,
    body_limit: usize,
    external_shutdown: Arc<AtomicBool>,
    notification: Arc<NotificationProtocol>,
    http_timeout: Duration,
}

impl Reactor {
    /// `notification` is the subscribe/unsubscribe protocol handler shared with whatever
    /// feeds blocks into a [`crate::notification::fanout::BlockProcessorPool`]; the
    /// reactor's only use for it is handing it to each upgraded WebSocket session so a
    /// `{"addr":...,"nonce":...}` frame can register that session as a subscriber.
    pub fn new(config: &DispatchConfig, router: Arc<Router>, notification: Arc<NotificationProtocol>) -> Result<Reactor, ReactorError> {
        let poll = Poll::new()?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let handle = ReactorHandle::new(tx, waker);

        let tls_context = if config.public_web_tls.port != 0 {
            Some(TlsContext::generate_self_signed(vec!["localhost".to_string()])?)
        } else {
            None
        };

        let mut reactor = Reactor {
            poll,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            ws_sessions: HashMap::new(),
            next_connection_token: CONNECTION_TOKEN_BASE,
            router,
            acl: Acl::new(config.acl.allowed_cidrs.clone()),
            auth: BasicAuthVerifier::from_config(&config.auth)?,
            tls_context,
            handle,
            reply_rx: rx,
            accepting: Arc::new(AtomicBool::new(true)),
            shutting_down: false,
            header_limit: 8 * 1024,
            body_limit: 16 * 1024 * 1024,
            external_shutdown: Arc::new(AtomicBool::new(false)),
            notification,
            http_timeout: Duration::from_secs(config.http_timeout_secs),
        };

        let mut next_listener_token = LISTENER_TOKEN_BASE;
        reactor.bind_socket(&config.private_rpc, SocketKind::PrivateRpc, &mut next_listener_token)?;
        reactor.bind_socket(&config.public_web, SocketKind::PublicWeb, &mut next_listener_token)?;
        if reactor.tls_context.is_some() {
            reactor.bind_socket(&config.public_web_tls, SocketKind::PublicWebTls, &mut next_listener_token)?;
        }
        reactor.bind_socket(&config.static_assets, SocketKind::StaticAssets, &mut next_listener_token)?;
        reactor.bind_socket(&config.rest, SocketKind::Rest, &mut next_listener_token)?;

        Ok(reactor)
    }

    fn bind_socket(&mut self, socket: &SocketConfig, kind: SocketKind, next_token: &mut usize) -> Result<(), ReactorError> {
        for host in &socket.bind_hosts {
            let addr = SocketAddr::new(*host, socket.port);
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(*next_token);
            *next_token += 1;
            self.poll.registry().register(&mut listener, token, Interest::READABLE)?;
            self.listeners.insert(
                token,
                Listener {
                    listener,
                    kind,
                    public_access: socket.public_access,
                },
            );
            tracing::info!(%addr, "listening");
        }
        Ok(())
    }

    /// A cloneable capability workers use to post replies back here. The reactor hands
    /// one to each [`Request`] it constructs.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// The actual bound address for one of the logical sockets (`"private_rpc"`,
    /// `"public_web"`, `"public_web_tls"`, `"static_assets"`, `"rest"`). Meant for tests
    /// that bind an ephemeral port (`:0`) and need to discover what the OS picked.
    pub fn local_addr(&self, socket_name: &str) -> Option<SocketAddr> {
        self.listeners
            .values()
            .find(|listener| listener.kind.name() == socket_name)
            .and_then(|listener| listener.listener.local_addr().ok())
    }

    /// Stops accepting new connections and tags in-flight ones for `Connection: close`.
    /// `run()` keeps draining already-accepted work until every connection finishes.
    pub fn request_shutdown(&mut self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutting_down = true;
    }

    /// A thread-safe flag another thread can flip to ask the (already running) reactor
    /// to shut down — `run()` cannot be called reentrantly from outside its own thread,
    /// so this is the only way to trigger `request_shutdown` from elsewhere. Intended to
    /// be flipped after the caller has already interrupted and stopped every pod, per the
    /// shutdown order: pods first, then the reactor.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.external_shutdown)
    }

    /// Runs the event loop until shutdown has been requested and every connection has
    /// drained. Blocking; intended to be the entire body of the reactor's thread.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.poll.poll(&mut events, Some(Duration::from_millis(200)))?;

            if !self.shutting_down && self.external_shutdown.load(Ordering::SeqCst) {
                self.request_shutdown();
            }

            // The only other owner of a session's Arc is a Weak in the subscriber
            // registry, so a closed session would otherwise never be dropped.
            self.ws_sessions.retain(|_, session| !session.is_closed());

            self.reap_idle_connections();

            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    self.drain_replies();
                    continue;
                }
                if let Some(listener_token) = self.listeners.keys().copied().find(|t| *t == event.token()) {
                    self.accept_loop(listener_token);
                    continue;
                }
                self.service_connection(event.token());
            }

            if self.shutting_down && self.connections.is_empty() {
                tracing::info!("reactor drained, exiting run loop");
                return Ok(());
            }
        }
    }

    fn accept_loop(&mut self, listener_token: Token) {
        loop {
            let (kind, public_access, accept_result) = {
                let listener = self.listeners.get_mut(&listener_token).expect("listener token must exist");
                (listener.kind, listener.public_access, listener.listener.accept())
            };
            let (mut stream, peer_addr) = match accept_result {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return;
                }
            };

            if !self.accepting.load(Ordering::SeqCst) {
                drop(stream);
                continue;
            }

            let token = Token(self.next_connection_token);
            self.next_connection_token += 1;

            if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE) {
                tracing::warn!(error = %e, "failed to register accepted connection");
                continue;
            }

            // An ACL-denied peer still gets a reply (403), not a silently closed socket —
            // the private RPC socket this check actually gates is never TLS (§6), so a
            // plaintext response before any TLS handshake is the right shape here.
            if !self.acl.allows(peer_addr.ip(), public_access) {
                tracing::warn!(%peer_addr, "connection rejected by ACL");
                self.connections.insert(
                    token,
                    Connection {
                        transport: Transport::Plain(stream),
                        kind,
                        public_access,
                        peer_addr,
                        buffer: ConnectionBuffer::new(self.header_limit, self.body_limit),
                        write_queue: Vec::new(),
                        last_activity: Instant::now(),
                    },
                );
                self.write_status_only(token, 403, &[]);
                self.drop_connection(token);
                continue;
            }

            let transport = if kind.is_tls() {
                let server_conn = self
                    .tls_context
                    .as_ref()
                    .expect("tls socket bound without a TlsContext")
                    .new_server_connection();
                match server_conn {
                    Ok(conn) => Transport::Tls(stream, Box::new(conn)),
                    Err(e) => {
                        tracing::warn!(error = %e, "TLS setup failed for accepted connection");
                        let _ = self.poll.registry().deregister(&mut stream);
                        continue;
                    }
                }
            } else {
                Transport::Plain(stream)
            };

            self.connections.insert(
                token,
                Connection {
                    transport,
                    kind,
                    public_access,
                    peer_addr,
                    buffer: ConnectionBuffer::new(self.header_limit, self.body_limit),
                    write_queue: Vec::new(),
                    last_activity: Instant::now(),
                },
            );
        }
    }

    /// Closes any connection that has sat idle (no bytes read or written) past
    /// `http_timeout_secs` — a peer that opens a socket and never sends a request, or
    /// stalls mid-request, would otherwise sit in the connection table forever, since
    /// `mio` only wakes us for sockets that actually have I/O to do.
    fn reap_idle_connections(&mut self) {
        let now = Instant::now();
        let timeout = self.http_timeout;
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, connection)| now.duration_since(connection.last_activity) > timeout)
            .map(|(&token, _)| token)
            .collect();
        for token in expired {
            tracing::debug!(timeout = ?timeout, "closing connection idle past the configured HTTP timeout");
            self.drop_connection(token);
        }
    }

    fn service_connection(&mut self, token: Token) {
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        connection.last_activity = Instant::now();

        if let Err(e) = pump_transport(&mut connection.transport) {
            tracing::debug!(error = %e, "connection I/O error, dropping");
            self.drop_connection(token);
            return;
        }

        let mut read_buf = [0u8; 4096];
        loop {
            match read_plaintext(&mut connection.transport, &mut read_buf) {
                Ok(0) => break,
                Ok(n) => connection.buffer.feed(&read_buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => {
                    self.drop_connection(token);
                    return;
                }
            }
        }

        loop {
            let Some(connection) = self.connections.get_mut(&token) else {
                return;
            };
            match connection.buffer.try_parse() {
                Ok(ParseOutcome::Incomplete) => break,
                Ok(ParseOutcome::Complete { request, consumed }) => {
                    connection.buffer.drain(consumed);
                    self.dispatch_parsed_request(token, request);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "malformed request, closing connection");
                    self.drop_connection(token);
                    return;
                }
            }
        }

        if let Some(connection) = self.connections.get_mut(&token) {
            if !connection.write_queue.is_empty() {
                flush_write_queue(connection);
            }
        }
    }

    fn dispatch_parsed_request(&mut self, token: Token, parsed: http::ParsedRequest) {
        let Some(connection) = self.connections.get(&token) else {
            return;
        };

        if connection.kind.requires_auth() {
            let credentials = auth_header_credentials(&parsed.headers);
            if let Err(e) = self.auth.verify(credentials) {
                tracing::debug!(error = %e, "auth rejected");
                // The throttle delay runs on its own short-lived thread and replies
                // through the same cross-thread channel workers use — the reactor
                // thread itself never blocks, so other connections keep being served
                // while a brute-forcer waits out its 401.
                let connection_id = ConnectionId(token.0 as u64);
                let handle = self.handle.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(250));
                    handle.send_response(
                        connection_id,
                        401,
                        vec![("WWW-Authenticate".to_string(), r#"Basic realm="jsonrpc""#.to_string())],
                        Vec::new(),
                    );
                });
                return;
            }
        }

        if is_websocket_upgrade(&parsed.headers) {
            self.upgrade_to_websocket(token, parsed);
            return;
        }

        if matches!(parsed.method, crate::request::Method::Unknown) {
            self.write_status_only(token, 405, &[]);
            return;
        }

        if matches!(parsed.method, crate::request::Method::Options) {
            self.write_status_only(
                token,
                204,
                &[
                    ("Access-Control-Allow-Origin", "*"),
                    ("Access-Control-Allow-Methods", "POST,GET,OPTIONS"),
                    ("Access-Control-Allow-Headers", "*"),
                ],
            );
            return;
        }

        let connection_id = ConnectionId(token.0 as u64);
        let request = Request::new(
            parsed.method,
            parsed.uri,
            parsed.headers,
            parsed.body,
            connection.peer_addr,
            connection.public_access,
            self.handle.clone(),
            connection_id,
        );
        let reply = request.reply_gateway();
        reply.write_header("Access-Control-Allow-Origin", "*");
        reply.write_header("Access-Control-Allow-Methods", "POST,GET,OPTIONS");
        reply.write_header("Access-Control-Allow-Headers", "*");
        if self.shutting_down {
            request.mark_shutting_down();
        }

        match self.router.process(request) {
            crate::router::RouteOutcome::Enqueued => {}
            crate::router::RouteOutcome::QueueFull => {}
            crate::router::RouteOutcome::NoRoute => {}
        }
    }

    fn write_status_only(&mut self, token: Token, status: u16, headers: &[(&str, &str)]) {
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        let mut response = format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status));
        for (k, v) in headers {
            response.push_str(&format!("{k}: {v}\r\n"));
        }
        response.push_str("Content-Length: 0\r\n\r\n");
        connection.write_queue.extend_from_slice(response.as_bytes());
        flush_write_queue(connection);
    }

    fn drain_replies(&mut self) {
        while let Ok(event) = self.reply_rx.try_recv() {
            let token = Token(event.connection_id.0 as usize);
            let Some(connection) = self.connections.get_mut(&token) else {
                continue;
            };
            let mut response = format!("HTTP/1.1 {} {}\r\n", event.status, reason_phrase(event.status));
            for (k, v) in &event.headers {
                response.push_str(&format!("{k}: {v}\r\n"));
            }
            response.push_str(&format!("Content-Length: {}\r\n\r\n", event.body.len()));
            connection.write_queue.extend_from_slice(response.as_bytes());
            connection.write_queue.extend_from_slice(&event.body);
            let close_after = connection
                .write_queue
                .windows(17)
                .any(|w| w.eq_ignore_ascii_case(b"Connection: close"));
            flush_write_queue(connection);
            if close_after {
                self.drop_connection(token);
            }
        }
    }

    /// Completes a WebSocket handshake ourselves (we already parsed the HTTP request off
    /// the wire, so `tungstenite::accept` — which wants to read the handshake itself —
    /// doesn't apply) and hands the now-upgraded socket to [`WebSocketConnection::spawn`].
    /// The reactor keeps the returned `Arc` alive for the session's lifetime: nothing
    /// else holds a strong reference to it (the registry only ever sees a `Weak`, §9).
    fn upgrade_to_websocket(&mut self, token: Token, parsed: http::ParsedRequest) {
        let Some(connection) = self.connections.get(&token) else {
            return;
        };
        if matches!(connection.transport, Transport::Tls(..)) {
            tracing::debug!("websocket upgrade over TLS is not supported");
            self.write_status_only(token, 400, &[]);
            self.drop_connection(token);
            return;
        }
        let peer_addr = connection.peer_addr;

        let mut builder = ::http::Request::builder().method("GET").uri(parsed.uri.as_str());
        for (name, value) in &parsed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = match builder.body(()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "malformed websocket upgrade request");
                self.write_status_only(token, 400, &[]);
                self.drop_connection(token);
                return;
            }
        };

        let response = match tungstenite::handshake::server::create_response(&request) {
            Ok(response) => response,
            Err(_) => {
                self.write_status_only(token, 400, &[]);
                self.drop_connection(token);
                return;
            }
        };

        let mut response_bytes = format!(
            "HTTP/1.1 {} {}\r\n",
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("")
        );
        for (name, value) in response.headers() {
            response_bytes.push_str(&format!("{}: {}\r\n", name.as_str(), value.to_str().unwrap_or("")));
        }
        response_bytes.push_str("\r\n");

        let accepted = self.connections.remove(&token).expect("checked present above");
        let Transport::Plain(mut stream) = accepted.transport else {
            unreachable!("TLS transport rejected above");
        };

        if let Err(e) = write_all_blocking(&mut stream, response_bytes.as_bytes()) {
            tracing::debug!(error = %e, "failed to write websocket handshake response");
            let _ = self.poll.registry().deregister(&mut stream);
            return;
        }
        let _ = self.poll.registry().deregister(&mut stream);

        let std_stream = match mio_stream_into_blocking_std(stream) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "failed to hand accepted socket to websocket bridge");
                return;
            }
        };

        let id = peer_addr.ip().to_string();
        let ws_socket = tungstenite::protocol::WebSocket::from_raw_socket(std_stream, tungstenite::protocol::Role::Server, None);
        let session = WebSocketConnection::spawn(ws_socket, Arc::clone(&self.notification), id.clone(), id);
        self.ws_sessions.insert(token, session);
        tracing::info!(%peer_addr, "upgraded connection to websocket");
    }

    fn drop_connection(&mut self, token: Token) {
        if let Some(mut connection) = self.connections.remove(&token) {
            match &mut connection.transport {
                Transport::Plain(stream) => {
                    let _ = self.poll.registry().deregister(stream);
                }
                Transport::Tls(stream, _) => {
                    let _ = self.poll.registry().deregister(stream);
                }
            }
        }
    }
}

fn pump_transport(transport: &mut Transport) -> std::io::Result<()> {
    if let Transport::Tls(stream, conn) = transport {
        if conn.wants_read() {
            match conn.read_tls(stream) {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof)),
                Ok(_) => {
                    conn.process_new_packets()
                        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        while conn.wants_write() {
            conn.write_tls(stream)?;
        }
    }
    Ok(())
}

fn read_plaintext(transport: &mut Transport, buf: &mut [u8]) -> std::io::Result<usize> {
    match transport {
        Transport::Plain(stream) => stream.read(buf),
        Transport::Tls(_, conn) => conn.reader().read(buf),
    }
}

fn flush_write_queue(connection: &mut Connection) {
    match &mut connection.transport {
        Transport::Plain(stream) => {
            if let Ok(n) = stream.write(&connection.write_queue) {
                connection.write_queue.drain(..n);
            }
        }
        Transport::Tls(stream, conn) => {
            let _ = conn.writer().write_all(&connection.write_queue);
            connection.write_queue.clear();
            while conn.wants_write() {
                if conn.write_tls(stream).is_err() {
                    break;
                }
            }
        }
    }
}

fn is_websocket_upgrade(headers: &[(String, String)]) -> bool {
    let upgrades_to_ws = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("Upgrade") && v.eq_ignore_ascii_case("websocket"));
    let connection_upgrade = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("Connection") && v.to_ascii_lowercase().contains("upgrade"));
    upgrades_to_ws && connection_upgrade
}

fn write_all_blocking(stream: &mut TcpStream, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        match stream.write(data) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(Duration::from_millis(1)),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// `tungstenite::WebSocket` does its own blocking reads on a dedicated thread, so the
/// accepted socket has to leave mio's non-blocking, poll-driven world first. Unix-only:
/// the raw-fd round trip is the only portable way to hand a `mio::net::TcpStream` to
/// code that wants a plain `std::net::TcpStream`.
#[cfg(unix)]
fn mio_stream_into_blocking_std(stream: TcpStream) -> std::io::Result<std::net::TcpStream> {
    use std::os::unix::io::{FromRawFd, IntoRawFd};
    let std_stream = unsafe { std::net::TcpStream::from_raw_fd(stream.into_raw_fd()) };
    std_stream.set_nonblocking(false)?;
    Ok(std_stream)
}

fn auth_header_credentials(headers: &[(String, String)]) -> Option<(String, String)> {
    let header = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("Authorization"))?;
    let encoded = header.1.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

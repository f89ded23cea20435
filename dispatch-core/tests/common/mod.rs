//! Shared harness for the end-to-end tests: a `DispatchConfig` bound to ephemeral
//! loopback ports, a reactor driven on its own thread, and a minimal blocking HTTP
//! client (no HTTP client crate is in the dependency set, and none of these tests need
//! more than "write a request, read a status line and a body").

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dispatch_core::config::{AuthConfig, DispatchConfig, SocketConfig};
use dispatch_core::notification::protocol::NotificationProtocol;
use dispatch_core::{Reactor, Router};

fn ephemeral_socket(public_access: bool) -> SocketConfig {
    SocketConfig {
        bind_hosts: vec!["127.0.0.1".parse().unwrap()],
        port: 0,
        public_access,
    }
}

/// All five sockets on ephemeral loopback ports, TLS disabled (port 0 means
/// `Reactor::new` never builds a `TlsContext`), Basic Auth configured with a fixed
/// user:pass so the private socket's auth gate is exercisable from a test.
pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        private_rpc: ephemeral_socket(false),
        public_web: ephemeral_socket(true),
        public_web_tls: SocketConfig {
            bind_hosts: vec!["127.0.0.1".parse().unwrap()],
            port: 0,
            public_access: true,
        },
        static_assets: ephemeral_socket(true),
        rest: ephemeral_socket(true),
        acl: Default::default(),
        auth: AuthConfig {
            configured_user: Some("node".to_string()),
            configured_pass: Some("s3cret".to_string()),
            ..Default::default()
        },
        pods: HashMap::new(),
        notification: dispatch_core::config::NotificationConfig { thread_count: 1 },
        http_timeout_secs: 30,
    }
}

pub struct RunningReactor {
    pub addrs: HashMap<&'static str, SocketAddr>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RunningReactor {
    /// Flips the reactor's shutdown flag without waiting for `run()` to return — lets a
    /// caller observe behavior (in-flight replies still landing, new requests refused)
    /// while the reactor is draining, before calling `join`.
    pub fn trigger_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("reactor thread panicked");
        }
    }

    /// Starts the shutdown sequence and waits for `run()` to return. Pods are not
    /// stopped here — callers that started pod worker pools are responsible for
    /// `router.interrupt_all()` / `router.stop_all()` first, per the documented
    /// shutdown order (pods, then the reactor).
    pub fn shutdown(self) {
        self.trigger_shutdown();
        self.join();
    }
}

/// Builds and starts a reactor on its own thread, returning once every listener has a
/// real bound address (ephemeral port 0 resolved by the OS). Callers that need to push
/// notifications (or inspect who subscribed) build their own registry/protocol pair and
/// pass it in, rather than this helper owning one it can't hand back.
pub fn spawn_reactor(config: DispatchConfig, router: Arc<Router>, notification: Arc<NotificationProtocol>) -> RunningReactor {
    let mut reactor = Reactor::new(&config, router, notification).expect("reactor construction failed");

    let mut addrs = HashMap::new();
    for name in ["private_rpc", "public_web", "public_web_tls", "static_assets", "rest"] {
        if let Some(addr) = reactor.local_addr(name) {
            addrs.insert(name, addr);
        }
    }

    let shutdown = reactor.shutdown_signal();
    let handle = std::thread::Builder::new()
        .name("test-reactor".to_string())
        .spawn(move || {
            reactor.run().expect("reactor run loop failed");
        })
        .expect("failed to spawn reactor thread");

    RunningReactor {
        addrs,
        shutdown,
        handle: Some(handle),
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Writes a bare-bones HTTP/1.1 request and reads back a single response. Reads until
/// either the full `Content-Length` body has arrived or the peer goes quiet for
/// `idle_timeout` — our reactor never closes a connection after replying (no
/// keep-alive teardown), so "quiet for a while" is this harness's end-of-response
/// signal rather than a socket close.
pub fn http_request(addr: SocketAddr, method: &str, path: &str, extra_headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect failed");
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: 127.0.0.1\r\n");
    for (k, v) in extra_headers {
        request.push_str(&format!("{k}: {v}\r\n"));
    }
    request.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                if response_is_complete(&raw) {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    parse_response(&raw)
}

fn response_is_complete(raw: &[u8]) -> bool {
    let Some(header_end) = find_crlf_crlf(raw) else {
        return false;
    };
    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let content_length: usize = header_text
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:").or_else(|| line.strip_prefix("content-length:")))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn find_crlf_crlf(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_response(raw: &[u8]) -> HttpResponse {
    let header_end = find_crlf_crlf(raw).unwrap_or(raw.len());
    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = header_text.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let body_start = (header_end + 4).min(raw.len());
    HttpResponse {
        status,
        headers,
        body: raw[body_start..].to_vec(),
    }
}

pub fn basic_auth_header(user: &str, pass: &str) -> String {
    use base64::Engine;
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}")))
}

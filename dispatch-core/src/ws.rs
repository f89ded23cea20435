//! `WebSocketConnection` bridges a `tungstenite` session to the [`Connection`]
//! abstraction: its own tiny reader and writer threads keep the notification fan-out
//! worker from ever blocking on a subscriber's socket. `tungstenite` (the plain, sync
//! sibling of `tokio-tungstenite`) is used rather than the teacher's usual async
//! WebSocket crate, because §5 forbids an async runtime in the core.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tungstenite::protocol::WebSocket;
use tungstenite::{Error as WsError, Message};

/// How long the reader thread's blocking `read()` waits before giving the writer
/// thread a turn at the shared socket lock.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

use crate::connection::Connection;
use crate::notification::protocol::NotificationProtocol;

/// Bridges one accepted WebSocket connection. `send_json` enqueues onto a bounded
/// channel drained by a dedicated writer thread, giving FIFO-per-subscriber delivery
/// without blocking the caller (typically the notification fan-out worker). Reader and
/// writer share one socket behind a `Mutex` (`tungstenite` frames both directions
/// through a single `WebSocket<Stream>`, so there's no way to split it into independent
/// halves); the reader's blocking `read()` is bounded by a read timeout so it keeps
/// releasing the lock instead of starving the writer indefinitely.
pub struct WebSocketConnection {
    outbound: crossbeam_channel::Sender<Vec<u8>>,
    remote_ip: String,
    closed: Arc<AtomicBool>,
}

impl WebSocketConnection {
    /// Spawns a reader thread (feeding incoming text frames to `protocol` under `id`)
    /// and a writer thread (draining `send_json` calls onto the socket), then returns a
    /// handle usable as a [`Connection`].
    pub fn spawn(socket: WebSocket<TcpStream>, protocol: Arc<NotificationProtocol>, id: String, remote_ip: String) -> Arc<WebSocketConnection> {
        if let Err(e) = socket.get_ref().set_read_timeout(Some(READ_POLL_INTERVAL)) {
            tracing::warn!(error = %e, "failed to set websocket read timeout");
        }

        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(256);
        let socket = Arc::new(Mutex::new(socket));

        let closed = Arc::new(AtomicBool::new(false));
        let handle = Arc::new(WebSocketConnection {
            outbound: tx,
            remote_ip: remote_ip.clone(),
            closed: Arc::clone(&closed),
        });

        let writer_socket = Arc::clone(&socket);
        thread::Builder::new()
            .name(format!("ws-writer-{id}"))
            .spawn(move || {
                for body in rx.iter() {
                    let mut socket = writer_socket.lock().unwrap();
                    if socket.send(Message::text(String::from_utf8_lossy(&body).into_owned())).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn websocket writer thread");

        let reader_socket = Arc::clone(&socket);
        let reader_id = id.clone();
        let weak_self: std::sync::Weak<dyn Connection> = Arc::downgrade(&(Arc::clone(&handle) as Arc<dyn Connection>));
        thread::Builder::new()
            .name(format!("ws-reader-{id}"))
            .spawn(move || loop {
                let message = {
                    let mut socket = reader_socket.lock().unwrap();
                    socket.read()
                };
                match message {
                    Ok(Message::Text(text)) => {
                        if let Ok(value) = serde_json::from_str(&text) {
                            let height = 0;
                            protocol.process_message(&value, weak_self.clone(), &remote_ip, &reader_id, height);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        protocol.force_delete(&reader_id);
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    // The read timeout expiring with nothing to read, not a real error:
                    // loop back around so the writer thread gets a turn at the lock.
                    Err(WsError::Io(ref e)) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                    Err(_) => {
                        protocol.force_delete(&reader_id);
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    _ => {}
                }
            })
            .expect("failed to spawn websocket reader thread");

        handle
    }

    /// Set once the reader thread has observed a close or I/O error. A reactor holding
    /// this session only to keep it alive (see `Reactor::ws_sessions`) uses this to know
    /// when it can drop its own reference — nothing else downgrades an `Arc` into
    /// dropping the session on its own.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for WebSocketConnection {
    fn send_json(&self, body: Vec<u8>) {
        let _ = self.outbound.try_send(body);
    }

    fn remote_ip(&self) -> String {
        self.remote_ip.clone()
    }
}

//! The cross-thread trigger primitive: workers never touch the socket. Instead a
//! [`ReactorHandle`] lets any thread hand a finished reply to the reactor thread, which
//! wakes its `mio::Poll` via a [`mio::Waker`] and drains the queued replies on its own
//! thread before going back to sleep in `poll()`.

use std::sync::Arc;

/// Identifies one accepted connection inside the reactor's connection table. Stable for
/// the lifetime of the connection; never reused while the connection is still tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

pub struct ReplyEvent {
    pub connection_id: ConnectionId,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A thread-safe capability workers use to schedule "send reply" events on the reactor
/// thread. Cloning is cheap; all clones share the same channel and waker.
#[derive(Clone)]
pub struct ReactorHandle {
    sender: crossbeam_channel::Sender<ReplyEvent>,
    waker: Arc<mio::Waker>,
}

impl ReactorHandle {
    pub fn new(sender: crossbeam_channel::Sender<ReplyEvent>, waker: Arc<mio::Waker>) -> Self {
        ReactorHandle { sender, waker }
    }

    /// Schedules a reply to fire "immediately" on the reactor thread: the event is
    /// pushed onto the channel and the reactor's blocked `poll()` call is woken at once.
    pub fn send_response(
        &self,
        connection_id: ConnectionId,
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) {
        let event = ReplyEvent {
            connection_id,
            status,
            headers,
            body,
        };
        if self.sender.send(event).is_ok() {
            // Best-effort: if the reactor has already shut down the waker call fails
            // harmlessly and the event is simply never drained.
            let _ = self.waker.wake();
        }
    }
}

//! [`Connection`] is the bridge-layer abstraction: "a thing you can push a JSON message
//! into, fire-and-forget, FIFO per connection, with a weak-reference-checkable
//! liveness." HTTP replies, WebSocket sessions, and WebRTC data channels all implement
//! it so the notification fan-out never needs to know which transport a subscriber uses.

use crate::request::ReplyGateway;

/// `send_json` never blocks the caller on transport I/O — implementations queue and let
/// a dedicated writer (or, for HTTP, the one-shot reply gateway) do the actual send.
pub trait Connection: Send + Sync {
    fn send_json(&self, body: Vec<u8>);

    fn remote_ip(&self) -> String;
}

/// The one-shot HTTP reply path wrapped as a `Connection`. Used only to satisfy
/// interfaces that want a `Connection`; HTTP connections are never registered as
/// fan-out subscribers (there is nothing to push a later message into).
pub struct HttpReplyConnection {
    gateway: ReplyGateway,
    remote_ip: String,
}

impl HttpReplyConnection {
    pub fn new(gateway: ReplyGateway, remote_ip: String) -> HttpReplyConnection {
        HttpReplyConnection { gateway, remote_ip }
    }
}

impl Connection for HttpReplyConnection {
    fn send_json(&self, body: Vec<u8>) {
        self.gateway.write_header("Content-Type", "application/json");
        self.gateway.write_reply(200, body);
    }

    fn remote_ip(&self) -> String {
        self.remote_ip.clone()
    }
}

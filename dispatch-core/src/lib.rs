//! Generic request-dispatch core for a peer-to-peer node: bounded per-pod worker
//! queues, a router of pods matching requests by URL prefix, a single-threaded reactor
//! accepting HTTP/TLS/WebSocket (and optional WebRTC) connections, a reply gateway for
//! posting replies back onto the reactor thread, and notification fan-out for pushing
//! blockchain events to subscribers.
//!
//! The surrounding blockchain, consensus, SQL persistence, and transaction model are
//! out of scope: this crate consumes a per-worker resource handle, pluggable command
//! tables, and an external event source, and exposes the dispatch primitives that tie
//! them together.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod logging;
pub mod notification;
pub mod pod;
pub mod queue;
pub mod reactor;
pub mod request;
pub mod router;
pub mod worker;
pub mod ws;

#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use config::DispatchConfig;
pub use error::DispatchError;
pub use pod::{RequestPod, RequestPodBuilder};
pub use queue::BoundedQueue;
pub use reactor::Reactor;
pub use request::{Method, Request, ReplyGateway};
pub use router::Router;

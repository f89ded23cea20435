//! Subscriber registry, protocol parsing, per-block fan-out, and stats aggregation —
//! the four pieces of §4.7's notification system.

pub mod fanout;
pub mod protocol;
pub mod stats;
pub mod subscriber;

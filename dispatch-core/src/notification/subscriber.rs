//! The subscriber registry: a process-wide concurrent map from client id to
//! [`Subscriber`], matching the original `NotifyableStorage` (`Notifications.cpp`).
//! Iteration holds the map's lock for the callback's duration (invariant 6) so
//! callbacks must not re-enter the map or block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::connection::Connection;

/// A registered client wanting per-address event pushes. `connection` is a weak
/// reference — "a subscriber is not a reason to keep a connection alive" (§9).
pub struct Subscriber {
    pub connection: Weak<dyn Connection>,
    pub address: String,
    pub declared_height: i64,
    pub peer_ip: String,
    pub service: bool,
    pub main_port: u16,
    pub wss_port: u16,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    clients: Mutex<HashMap<String, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> SubscriberRegistry {
        SubscriberRegistry::default()
    }

    pub fn insert_or_replace(&self, id: String, subscriber: Subscriber) {
        self.clients.lock().unwrap().insert(id, subscriber);
    }

    pub fn remove(&self, id: &str) {
        self.clients.lock().unwrap().remove(id);
    }

    /// Alias kept distinct from `remove` for call sites that model "the transport died,
    /// not a voluntary unsubscribe" — both end up removing the entry.
    pub fn force_delete(&self, id: &str) {
        self.remove(id);
    }

    /// Runs `f` for every subscriber under the map's lock. `f` must not call back into
    /// the registry (invariant 6).
    pub fn iterate(&self, mut f: impl FnMut(&str, &Subscriber)) {
        let clients = self.clients.lock().unwrap();
        for (id, subscriber) in clients.iter() {
            f(id, subscriber);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct DummyConnection;
    impl Connection for DummyConnection {
        fn send_json(&self, _body: Vec<u8>) {}
        fn remote_ip(&self) -> String {
            "127.0.0.1".to_string()
        }
    }

    fn make_subscriber(address: &str) -> (Arc<dyn Connection>, Subscriber) {
        let conn: Arc<dyn Connection> = Arc::new(DummyConnection);
        let subscriber = Subscriber {
            connection: Arc::downgrade(&conn),
            address: address.to_string(),
            declared_height: 0,
            peer_ip: "127.0.0.1".to_string(),
            service: false,
            main_port: 8899,
            wss_port: 8099,
        };
        (conn, subscriber)
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let registry = SubscriberRegistry::new();
        let (_conn, subscriber) = make_subscriber("A1");
        registry.insert_or_replace("client-1".to_string(), subscriber);
        assert_eq!(registry.len(), 1);
        registry.remove("client-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn force_delete_removes_dead_entry() {
        let registry = SubscriberRegistry::new();
        let (_conn, subscriber) = make_subscriber("A1");
        registry.insert_or_replace("client-1".to_string(), subscriber);
        registry.force_delete("client-1");
        assert!(registry.is_empty());
    }
}

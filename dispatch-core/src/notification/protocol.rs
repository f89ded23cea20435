//! Kept close to the original `NotificationProtocol::ProcessMessage`, which dispatches
//! purely on JSON key presence rather than a tagged `"type"` field: `addr`+`nonce`
//! subscribes, `addr`+`msg:"unsubscribe"` unsubscribes, anything else with no `addr` is
//! not a protocol message at all.

use serde_json::Value;
use std::sync::{Arc, Weak};

use crate::connection::Connection;
use crate::notification::subscriber::{Subscriber, SubscriberRegistry};

const DEFAULT_MAIN_PORT: u16 = 8899;
const DEFAULT_WSS_PORT: u16 = 8099;

pub struct NotificationProtocol {
    registry: Arc<SubscriberRegistry>,
}

impl NotificationProtocol {
    pub fn new(registry: Arc<SubscriberRegistry>) -> NotificationProtocol {
        NotificationProtocol { registry }
    }

    /// `true` if `msg` was recognized and applied (subscribe, resubscribe, or
    /// unsubscribe); `false` if it carries no `addr` key at all.
    pub fn process_message(&self, msg: &Value, connection: Weak<dyn Connection>, peer_ip: &str, id: &str, current_height: i64) -> bool {
        let Some(obj) = msg.as_object() else {
            return false;
        };
        let Some(addr) = obj.get("addr").and_then(Value::as_str) else {
            return false;
        };

        if obj.contains_key("nonce") {
            let declared_height = obj.get("block").and_then(Value::as_i64).unwrap_or(current_height);
            let service = obj.contains_key("service");
            let main_port = obj.get("mainport").and_then(Value::as_u64).unwrap_or(DEFAULT_MAIN_PORT as u64) as u16;
            let wss_port = obj.get("wssport").and_then(Value::as_u64).unwrap_or(DEFAULT_WSS_PORT as u64) as u16;

            self.registry.insert_or_replace(
                id.to_string(),
                Subscriber {
                    connection,
                    address: addr.to_string(),
                    declared_height,
                    peer_ip: peer_ip.to_string(),
                    service,
                    main_port,
                    wss_port,
                },
            );
            return true;
        }

        if obj.get("msg").and_then(Value::as_str) == Some("unsubscribe") {
            self.registry.remove(id);
        }

        true
    }

    pub fn force_delete(&self, id: &str) {
        self.registry.force_delete(id);
    }
}

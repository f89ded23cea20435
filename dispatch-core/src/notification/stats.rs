//! `collect_stats()` snapshots the registry's `service=true` subscribers — peers that
//! advertise themselves as proxying nodes — mirroring `Notifications::CollectStats`.

use serde::Serialize;

use super::subscriber::SubscriberRegistry;

#[derive(Serialize)]
pub struct ServiceSubscriberStats {
    pub address: String,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "portWss")]
    pub port_wss: u16,
}

pub fn collect_stats(registry: &SubscriberRegistry) -> Vec<ServiceSubscriberStats> {
    let mut stats = Vec::new();
    registry.iterate(|_id, subscriber| {
        if subscriber.service {
            stats.push(ServiceSubscriberStats {
                address: subscriber.address.clone(),
                ip: subscriber.peer_ip.clone(),
                port: subscriber.main_port,
                port_wss: subscriber.wss_port,
            });
        }
    });
    stats
}

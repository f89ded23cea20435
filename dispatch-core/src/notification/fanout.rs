//! The block processor: a worker pool, structured exactly like
//! [`crate::worker::WorkerPool`] (long-lived named threads, cooperative
//! running-flag-plus-interrupt cancellation) but draining `(block, block_height)` items
//! instead of HTTP work items. Delivery is best-effort and fire-and-forget — one
//! subscriber's dead connection never blocks or fails delivery to another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::queue::BoundedQueue;

use super::subscriber::SubscriberRegistry;

/// One blockchain event derived from a block, targeting a single address. Kind names
/// (post, comment, score, transfer, ...) are external to this core — callers supply
/// whatever `BlockEvent`s their indexing layer derives.
#[derive(Clone, Serialize)]
pub struct BlockEvent {
    pub address: String,
    pub kind: String,
    pub payload: serde_json::Value,
}

pub struct BlockItem {
    pub height: i64,
    pub events: Vec<BlockEvent>,
}

pub struct BlockProcessorPool {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    queue: BoundedQueue<BlockItem>,
}

impl BlockProcessorPool {
    /// Spawns `thread_count` workers draining `queue`, each pushing matching events to
    /// `registry`'s subscribers.
    pub fn spawn(thread_count: usize, queue: BoundedQueue<BlockItem>, registry: Arc<SubscriberRegistry>) -> BlockProcessorPool {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(thread_count);

        for idx in 0..thread_count {
            let queue = queue.clone();
            let running = Arc::clone(&running);
            let registry = Arc::clone(&registry);
            let thread_name = format!("notification-worker-{idx}");

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    tracing::info!(worker = %thread_name, "notification worker started");
                    loop {
                        let running_check = Arc::clone(&running);
                        let item = queue.get_next(
                            || running_check.load(Ordering::SeqCst),
                            || running.load(Ordering::SeqCst),
                        );
                        let Some(item) = item else {
                            break;
                        };
                        process_block(&registry, &item);
                    }
                    tracing::info!(worker = %thread_name, "notification worker stopped");
                })
                .expect("failed to spawn notification worker thread");
            handles.push(handle);
        }

        BlockProcessorPool { running, handles, queue }
    }

    pub fn interrupt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.interrupt();
    }

    pub fn stop(self) {
        self.interrupt();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn process_block(registry: &SubscriberRegistry, item: &BlockItem) {
    for event in &item.events {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize block event, skipping");
                continue;
            }
        };

        let mut dead_ids = Vec::new();
        registry.iterate(|id, subscriber| {
            if subscriber.address != event.address {
                return;
            }
            match subscriber.connection.upgrade() {
                Some(connection) => connection.send_json(body.clone()),
                None => dead_ids.push(id.to_string()),
            }
        });
        for id in dead_ids {
            registry.force_delete(&id);
        }
    }
    tracing::debug!(height = item.height, events = item.events.len(), "block processed for fan-out");
}

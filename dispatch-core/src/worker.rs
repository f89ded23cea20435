//! N long-lived OS threads draining one [`BoundedQueue`], each owning a private
//! per-worker resource constructed inside the thread itself so it is never shared.
//!
//! Suspension happens only inside [`BoundedQueue::get_next`]'s condition wait.
//! Cancellation is cooperative: `stop()` flips `running` to false, interrupts the
//! queue, and joins every thread; in-flight work items run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::BoundedQueue;
use crate::request::WorkItem;

/// Constructs the resource a single worker thread privately owns for its lifetime (a
/// database connection, typically). Called once, on the worker thread, before the
/// thread enters its processing loop.
pub trait WorkerResourceFactory: Send + Sync {
    type Resource: 'static;

    fn create(&self) -> Self::Resource;
}

pub struct FnResourceFactory<R, F: Fn() -> R> {
    f: F,
}

impl<R, F: Fn() -> R> FnResourceFactory<R, F> {
    pub fn new(f: F) -> Self {
        FnResourceFactory { f }
    }
}

impl<R, F> WorkerResourceFactory for FnResourceFactory<R, F>
where
    R: 'static,
    F: Fn() -> R + Send + Sync,
{
    type Resource = R;

    fn create(&self) -> R {
        (self.f)()
    }
}

pub struct WorkerPool {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    queue: BoundedQueue<WorkItem>,
}

impl WorkerPool {
    /// Spawns `thread_count` workers, each bound to `queue` and to a freshly
    /// constructed `R::Resource`.
    pub fn spawn<R>(name: &str, thread_count: usize, queue: BoundedQueue<WorkItem>, resource_factory: Arc<R>) -> WorkerPool
    where
        R: WorkerResourceFactory + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(thread_count);

        for idx in 0..thread_count {
            let queue = queue.clone();
            let running = Arc::clone(&running);
            let resource_factory = Arc::clone(&resource_factory);
            let thread_name = format!("{name}-worker-{idx}");

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    let mut resource = resource_factory.create();
                    tracing::info!(worker = %thread_name, "worker started");
                    loop {
                        let running_check = Arc::clone(&running);
                        let item = queue.get_next(
                            || running_check.load(Ordering::SeqCst),
                            || running.load(Ordering::SeqCst),
                        );
                        let Some(item) = item else {
                            break;
                        };
                        let path_tail = item.path_tail.clone();
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            item.handler.exec(
                                &item.path_tail,
                                item.method,
                                &item.headers,
                                item.body,
                                item.reply_gateway,
                                &mut resource,
                            );
                        }));
                        if let Err(panic) = result {
                            let message = panic_message(&panic);
                            tracing::error!(worker = %thread_name, path = %path_tail, error = %message, "handler panicked");
                            // The reply gateway was moved into the closure and dropped
                            // with the panic; the `Request`'s own Drop fallback (a 500)
                            // already fired, so there is nothing further to send here.
                        }
                    }
                    tracing::info!(worker = %thread_name, "worker stopped");
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        WorkerPool {
            running,
            handles,
            queue,
        }
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

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! Thread-safe FIFO with an optional depth cap, blocking `take`, and a broadcast
//! interrupt used purely for cancellation.
//!
//! The fixed operation order is *lock → pre → (possibly wait) → post → pop*: a worker
//! re-checks its "still running" flag both before sleeping and after waking, which is
//! what lets [`BoundedQueue::get_next`] eliminate the classical shutdown race where an
//! `interrupt()` fires between the check and the wait.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    max_depth: Option<usize>,
}

/// A thread-safe FIFO queue. Cheap to clone — clones share the same backing storage.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        BoundedQueue {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// `max_depth = None` gives an unbounded queue whose `add` always succeeds.
    pub fn new(max_depth: Option<usize>) -> Self {
        BoundedQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                }),
                not_empty: Condvar::new(),
                max_depth,
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// `Ok(())` on success, `Err(item)` if the queue is at `max_depth` (bounded only).
    /// Handing the item back on failure (rather than a bare `bool`) is the idiomatic
    /// Rust shape for this — it lets a caller reply to a rejected request instead of
    /// silently losing it, matching "queue full: non-fatal, caller decides."
    pub fn add(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(max_depth) = self.inner.max_depth {
            if state.items.len() >= max_depth {
                return Err(item);
            }
        }
        state.items.push_back(item);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Atomically: lock → `pre()` (abort if false) → wait while empty → `post()` (abort
    /// if false) → pop front. `pre`/`post` are evaluated exactly once each, fixing the
    /// apparent double-evaluation in the original C++ (`if (post) { if (!post) ... }`):
    /// there was never a reason to call the same predicate twice, so it is treated as a
    /// transcription artifact rather than intentional behavior.
    pub fn get_next(&self, pre: impl Fn() -> bool, post: impl Fn() -> bool) -> Option<T> {
        let mut state = self.inner.state.lock().unwrap();
        if !pre() {
            return None;
        }
        while state.items.is_empty() {
            state = self.inner.not_empty.wait(state).unwrap();
            // A spurious or interrupt-driven wake can land here with the queue still
            // empty; re-check `post` below before looping again so shutdown still
            // takes effect on the next interrupt rather than spinning forever.
            if !post() {
                return None;
            }
        }
        if !post() {
            return None;
        }
        state.items.pop_front()
    }

    /// Blocking take with no pre/post checks.
    pub fn take(&self) -> T {
        self.get_next(|| true, || true)
            .expect("take() predicates never return false")
    }

    /// Broadcasts a wake on the condition variable without mutating the queue. This is
    /// the cancellation primitive: a worker blocked in `get_next` wakes up, re-evaluates
    /// `post`, and exits cleanly if its `running` flag has gone false.
    pub fn interrupt(&self) {
        // Hold the lock while notifying so a thread that hasn't yet entered `wait`
        // still observes the interrupt instead of racing past it.
        let _state = self.inner.state.lock().unwrap();
        self.inner.not_empty.notify_all();
    }

    pub fn size(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

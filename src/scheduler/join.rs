//! Completion tracking for a task tree that grows while it runs.
//!
//! Every task registers with the [`JoinCounter`] *before* it is handed to a
//! pool, including tasks synthesized inside another task's execution. A
//! parent registers its children before its own guard drops, so the count
//! can only reach zero once no running task is left to synthesize more work.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct JoinState {
    in_flight: AtomicUsize,
    registered: AtomicU64,
    zero: Notify,
}

/// Shared count of in-flight tasks.
#[derive(Debug, Clone, Default)]
pub struct JoinCounter {
    state: Arc<JoinState>,
}

/// Registration of one task. Dropping it decrements the counter exactly once.
#[derive(Debug)]
pub struct JoinGuard {
    state: Arc<JoinState>,
}

impl JoinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for a task about to be submitted.
    pub fn register(&self) -> JoinGuard {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state.registered.fetch_add(1, Ordering::Relaxed);
        JoinGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Total registrations since creation.
    pub fn registered(&self) -> u64 {
        self.state.registered.load(Ordering::Relaxed)
    }

    /// Wait until the counter is zero.
    ///
    /// Returns immediately when nothing is registered. The waiter is armed
    /// before the count is read, so a decrement racing with this call is
    /// never missed.
    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.state.zero.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for JoinGuard {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.zero.notify_waiters();
        }
    }
}

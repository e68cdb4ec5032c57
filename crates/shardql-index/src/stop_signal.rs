//! One-shot stop signal for a shard's background loops (§5).
//!
//! Adapted from the plain atomic-flag shutdown switch pattern: a single
//! `AtomicBool` plus a `Notify` so a sleeping `tokio::time::interval` wakes
//! immediately instead of waiting out its last tick. `signal` is safe to
//! call more than once — only the first call has any effect — but in
//! practice the Closed-state transition gate ensures it is only ever called
//! once per shard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn signal(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `signal` has been called. Used inside `tokio::select!`
    /// alongside an interval tick.
    pub async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopped_resolves_immediately_if_already_signalled() {
        let s = StopSignal::new();
        s.signal();
        s.stopped().await;
    }

    #[tokio::test]
    async fn signal_wakes_pending_waiter() {
        let s = StopSignal::new();
        let s2 = s.clone();
        let handle = tokio::spawn(async move {
            s2.stopped().await;
        });
        tokio::task::yield_now().await;
        s.signal();
        handle.await.unwrap();
    }
}

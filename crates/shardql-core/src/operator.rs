//! The pull-based operator contract shared by every pipeline operator
//! (§4.2): `Open` → repeated `Next` → `Close`, plus a cancellation token and
//! running counters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult};

/// Cooperative cancellation token threaded through every `Open`/`Next` call.
///
/// Cheaply cloneable; all clones observe the same cancellation and deadline.
/// Operators must check it before doing work that could block or allocate
/// unboundedly, and materializing operators must additionally check it
/// between buffering iterations (§4.2, §5).
#[derive(Clone)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a child context carrying the same cancellation flag but a
    /// tighter (or equal) deadline. The deadline is authoritative (§5).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let tighter = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancelled: self.cancelled.clone(),
            deadline: Some(tighter),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// Check the token, returning `Err(CoreError::Cancelled)` promptly if
    /// cancellation or the deadline has been observed.
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters exposed by every operator (§4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub rows_read: u64,
    pub rows_returned: u64,
    pub took_millis: u64,
}

/// Lifecycle state backing the closed-sentinel check every operator
/// implementation shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initial,
    Opened,
    Closed,
}

/// A stateful pull iterator over [`crate::value::Row`]s.
///
/// `Open` is idempotent and must propagate to children. `Next` returns a row,
/// end-of-stream (`Ok(None)`), a cancellation error, or any upstream error; it
/// must check the context before doing work. `Close` is idempotent, closes
/// children, and is safe to call after partial iteration or before `Open`.
pub trait Operator: Send {
    /// Idempotent open; must propagate to children. Compilation-class
    /// failures (bad regex, unknown function, ...) surface here (§7).
    fn open(&mut self, ctx: &Context) -> CoreResult<()>;

    /// Returns the next row, or `Ok(None)` at end-of-stream. End-of-stream is
    /// a distinct sentinel, not an error.
    fn next(&mut self, ctx: &Context) -> CoreResult<Option<crate::value::Row>>;

    /// Idempotent close; safe after partial iteration or before `Open`.
    fn close(&mut self) -> CoreResult<()>;

    fn stats(&self) -> Stats;
}

/// Helper for operator implementations: guard against `Next`/`Close` misuse
/// outside the Opened state (§3: "After Close or before Open, Next must fail
/// with a closed-sentinel error").
pub fn require_opened(state: Lifecycle) -> CoreResult<()> {
    match state {
        Lifecycle::Opened => Ok(()),
        _ => Err(CoreError::Closed),
    }
}

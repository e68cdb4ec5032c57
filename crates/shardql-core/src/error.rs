//! Shared error kinds for the shard core and the pipeline executor (§7).
//!
//! Kept as a hand-rolled enum in the style of a single shard-processing error
//! type rather than pulled in through a derive macro: the variant set is
//! small and stable, and each one carries exactly the context its caller
//! needs to decide whether to retry, fail the request, or just log.

use std::fmt;

/// Errors that can surface from the shard core or the executor.
#[derive(Debug)]
pub enum CoreError {
    /// Shard state != Started. Reported, not retried.
    NotReady { index: String, shard: u32 },
    /// Shard, key, document, or lookup table missing.
    NotFound(String),
    /// `MaxShards` would be exceeded.
    CapacityExceeded { max: usize },
    /// Bad regex, bad Grok pattern, unknown aggregation/function. Surfaces
    /// at operator-Open so the query fails fast.
    InvalidInput(String),
    /// commit/refresh/search/indexDocument failure from the underlying
    /// engine.
    EngineFailure(Box<dyn std::error::Error + Send + Sync>),
    /// Non-fatal within an operator: logged, row dropped, iteration
    /// continues. Never propagated out of an operator's `Next`.
    ExecutionError(String),
    /// Context/cancel token observed. Propagate immediately.
    Cancelled,
    /// `Next` called before `Open` or after `Close`.
    Closed,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady { index, shard } => {
                write!(f, "shard {index}:{shard} is not started")
            }
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::CapacityExceeded { max } => write!(f, "capacity exceeded: max_shards={max}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::EngineFailure(e) => write!(f, "engine failure: {e}"),
            Self::ExecutionError(msg) => write!(f, "execution error: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Closed => write!(f, "operator is closed"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EngineFailure(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl CoreError {
    pub fn engine(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::EngineFailure(Box::new(e))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn exec(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

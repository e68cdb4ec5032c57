//! `GetBatchStats()` response shape (§4.8 / §6): a snapshot of the
//! commit/refresh bookkeeping a shard keeps, taken under its shared lock.

/// Snapshot of a shard's batch-indexing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub pending_docs: u64,
    pub total_docs: u64,
    pub needs_commit: bool,
    pub needs_refresh: bool,
    pub ms_since_last_commit: u64,
    pub ms_since_last_refresh: u64,
    pub commit_batch_size: u64,
    pub commit_interval_ms: u64,
    pub refresh_interval_ms: u64,
}

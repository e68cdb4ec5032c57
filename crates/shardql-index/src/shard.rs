//! The per-shard indexing core (§4.8): a single shard couples a document
//! writer, a batch-commit/durability boundary, and a background refresh
//! cycle that makes committed documents searchable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use shardql_core::error::{CoreError, CoreResult};
use shardql_core::value::Row;

use crate::analyzer::{Analyzer, AnalyzerCache, AnalyzerSettings};
use crate::engine::{create_shard_engine, EngineResult, SearchEngine, SearchResult};
use crate::filter::{apply_udf_filter, UdfFilter};
use crate::stats::BatchStats;
use crate::stop_signal::StopSignal;

/// Shard lifecycle (§3): `Initializing -> Started -> (Relocating) -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardLifecycle {
    Initializing,
    Started,
    Relocating,
    Closed,
}

/// Default page size when a scan omits one (§4.10).
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// `commitBatchSize`/`commitInterval`/`refreshInterval` (§6 Configuration).
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub commit_batch_size: u64,
    pub commit_interval: Duration,
    pub refresh_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            commit_batch_size: 1000,
            commit_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(1),
        }
    }
}

/// The batch-indexing state inside a Shard (§3).
struct Inner {
    lifecycle: ShardLifecycle,
    pending_docs: u64,
    docs_count: u64,
    needs_commit: bool,
    needs_refresh: bool,
    last_commit_time: Instant,
    last_refresh_time: Instant,
    config: BatchConfig,
    analyzer_settings: AnalyzerSettings,
}

impl Inner {
    fn new(config: BatchConfig) -> Self {
        let now = Instant::now();
        Self {
            lifecycle: ShardLifecycle::Initializing,
            pending_docs: 0,
            docs_count: 0,
            needs_commit: false,
            needs_refresh: false,
            last_commit_time: now,
            last_refresh_time: now,
            config,
            analyzer_settings: AnalyzerSettings::default(),
        }
    }
}

struct BackgroundHandles {
    stop: StopSignal,
    committer: tokio::task::JoinHandle<()>,
    refresher: tokio::task::JoinHandle<()>,
}

/// One partition of an index on one node (§3).
pub struct Shard {
    pub index_name: String,
    pub shard_id: u32,
    pub is_primary: bool,
    path: PathBuf,
    engine: Box<dyn SearchEngine>,
    udf: Option<Arc<dyn UdfFilter>>,
    analyzer_cache: AnalyzerCache,
    state: RwLock<Inner>,
    background: parking_lot::Mutex<Option<BackgroundHandles>>,
}

impl Shard {
    /// Opens the engine at `path` and constructs the shard wrapper in
    /// `Initializing` state. Call [`Shard::start`] to transition to
    /// `Started` and begin the background loops.
    pub fn open(
        index_name: impl Into<String>,
        shard_id: u32,
        path: impl Into<PathBuf>,
        is_primary: bool,
        config: BatchConfig,
        udf: Option<Arc<dyn UdfFilter>>,
    ) -> CoreResult<Self> {
        let path = path.into();
        let engine = create_shard_engine(&path).map_err(CoreError::engine)?;
        Ok(Self {
            index_name: index_name.into(),
            shard_id,
            is_primary,
            path,
            engine,
            udf,
            analyzer_cache: AnalyzerCache::new(),
            state: RwLock::new(Inner::new(config)),
            background: parking_lot::Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn not_ready(&self) -> CoreError {
        CoreError::NotReady {
            index: self.index_name.clone(),
            shard: self.shard_id,
        }
    }

    pub fn lifecycle(&self) -> ShardLifecycle {
        self.state.read().lifecycle
    }

    pub fn docs_count(&self) -> u64 {
        self.state.read().docs_count
    }

    /// Transitions `Initializing -> Started` and spawns the background
    /// committer and refresher loops. Idempotent: calling `start` again on an
    /// already-started shard is a no-op.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if state.lifecycle != ShardLifecycle::Initializing {
                return;
            }
            state.lifecycle = ShardLifecycle::Started;
        }
        let stop = StopSignal::new();
        let committer = tokio::spawn(committer_loop(self.clone(), stop.clone()));
        let refresher = tokio::spawn(refresher_loop(self.clone(), stop.clone()));
        *self.background.lock() = Some(BackgroundHandles {
            stop,
            committer,
            refresher,
        });
    }

    /// `commitBatch()` (lock held): a no-op when there is nothing pending.
    fn commit_batch_locked(&self, state: &mut Inner) -> CoreResult<()> {
        if !(state.needs_commit && state.pending_docs > 0) {
            return Ok(());
        }
        self.engine.commit().map_err(CoreError::engine)?;
        state.pending_docs = 0;
        state.needs_commit = false;
        state.needs_refresh = true;
        state.last_commit_time = Instant::now();
        Ok(())
    }

    /// `refreshReader()` (lock held): failure leaves `needsRefresh` true so
    /// the next tick retries.
    fn refresh_reader_locked(&self, state: &mut Inner) -> CoreResult<()> {
        if !state.needs_refresh {
            return Ok(());
        }
        self.engine.refresh().map_err(CoreError::engine)?;
        state.needs_refresh = false;
        state.last_refresh_time = Instant::now();
        Ok(())
    }

    pub fn index_document(&self, id: &str, doc: &Row) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        self.engine.index_document(id, doc).map_err(CoreError::engine)?;
        state.pending_docs += 1;
        state.docs_count += 1;
        state.needs_commit = true;
        let past_batch = state.pending_docs >= state.config.commit_batch_size;
        let past_interval = state.last_commit_time.elapsed() >= state.config.commit_interval;
        if past_batch || past_interval {
            self.commit_batch_locked(&mut state)?;
        }
        Ok(())
    }

    pub fn delete_document(&self, id: &str) -> CoreResult<bool> {
        let mut state = self.state.write();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        let removed = self.engine.delete_document(id).map_err(CoreError::engine)?;
        if removed {
            state.docs_count = state.docs_count.saturating_sub(1);
        }
        Ok(removed)
    }

    pub fn get_document(&self, id: &str) -> CoreResult<Option<Row>> {
        let state = self.state.read();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        self.engine.get_document(id).map_err(CoreError::engine)
    }

    /// Runs `engine.search`, then applies the best-effort UDF post-filter
    /// (§4.8) if the query carries its marker.
    pub fn search(&self, query: &[u8], from: usize, size: usize) -> CoreResult<SearchResult> {
        let state = self.state.read();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        let mut result = self.engine.search(query, from, size).map_err(CoreError::engine)?;
        result.hits = apply_udf_filter(self.udf.as_deref(), query, result.hits);
        Ok(result)
    }

    pub fn flush(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        let mut first_err: Option<CoreError> = None;
        if state.needs_commit && state.pending_docs > 0 {
            if let Err(e) = self.commit_batch_locked(&mut state) {
                first_err = Some(e);
            }
        }
        if state.needs_refresh {
            if let Err(e) = self.refresh_reader_locked(&mut state) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn set_batch_config(&self, config: BatchConfig) {
        let mut state = self.state.write();
        state.config = config;
    }

    pub fn batch_stats(&self) -> BatchStats {
        let state = self.state.read();
        BatchStats {
            pending_docs: state.pending_docs,
            total_docs: state.docs_count,
            needs_commit: state.needs_commit,
            needs_refresh: state.needs_refresh,
            ms_since_last_commit: state.last_commit_time.elapsed().as_millis() as u64,
            ms_since_last_refresh: state.last_refresh_time.elapsed().as_millis() as u64,
            commit_batch_size: state.config.commit_batch_size,
            commit_interval_ms: state.config.commit_interval.as_millis() as u64,
            refresh_interval_ms: state.config.refresh_interval.as_millis() as u64,
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        self.state.read().analyzer_settings.clone()
    }

    pub fn set_analyzer_settings(&self, settings: AnalyzerSettings) {
        self.state.write().analyzer_settings = settings;
    }

    pub fn analyze_text(&self, field: Option<&str>, text: &str) -> CoreResult<Vec<String>> {
        let state = self.state.read();
        if state.lifecycle != ShardLifecycle::Started {
            return Err(self.not_ready());
        }
        let analyzer_name = match field {
            Some(f) => state.analyzer_settings.analyzer_for_field(f).to_string(),
            None => state.analyzer_settings.default_analyzer.clone(),
        };
        drop(state);
        let analyzer: Arc<dyn Analyzer> = self.analyzer_cache.get_or_build(&analyzer_name);
        Ok(analyzer.analyze(text))
    }

    /// Close protocol (§4.8): set state, stop background loops outside the
    /// lock, reacquire to flush best-effort, then close the engine handle
    /// and analyzer cache. Idempotent.
    pub fn close(&self) -> CoreResult<()> {
        {
            let mut state = self.state.write();
            if state.lifecycle == ShardLifecycle::Closed {
                return Ok(());
            }
            state.lifecycle = ShardLifecycle::Closed;
        }

        if let Some(handles) = self.background.lock().take() {
            handles.stop.signal();
            // Background tasks hold no reference back into this call, so
            // joining here cannot deadlock against the lock we just released.
            handles.committer.abort();
            handles.refresher.abort();
        }

        let mut first_err: Option<CoreError> = None;
        {
            let mut state = self.state.write();
            if state.needs_commit && state.pending_docs > 0 {
                match self.commit_batch_locked(&mut state) {
                    Ok(()) => state.needs_refresh = true,
                    Err(e) => {
                        log::warn!(
                            "shard {}:{} best-effort commit on close failed: {e}",
                            self.index_name,
                            self.shard_id
                        );
                        first_err = Some(e);
                    }
                }
            }
            if state.needs_refresh {
                if let Err(e) = self.refresh_reader_locked(&mut state) {
                    log::warn!(
                        "shard {}:{} best-effort refresh on close failed: {e}",
                        self.index_name,
                        self.shard_id
                    );
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if let Err(e) = self.engine.close() {
            log::warn!(
                "shard {}:{} engine close failed: {e}",
                self.index_name,
                self.shard_id
            );
            if first_err.is_none() {
                first_err = Some(CoreError::engine(e));
            }
        }
        self.analyzer_cache.clear();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn committer_loop(shard: Arc<Shard>, stop: StopSignal) {
    loop {
        let interval = shard.state.read().config.commit_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let mut state = shard.state.write();
                if state.lifecycle != ShardLifecycle::Started {
                    break;
                }
                if state.needs_commit && state.pending_docs > 0 {
                    if let Err(e) = shard.commit_batch_locked(&mut state) {
                        log::warn!(
                            "shard {}:{} background commit failed: {e}",
                            shard.index_name, shard.shard_id
                        );
                    }
                }
            }
            _ = stop.stopped() => break,
        }
    }
}

async fn refresher_loop(shard: Arc<Shard>, stop: StopSignal) {
    loop {
        let interval = shard.state.read().config.refresh_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let mut state = shard.state.write();
                if state.lifecycle != ShardLifecycle::Started {
                    break;
                }
                if state.needs_refresh {
                    if let Err(e) = shard.refresh_reader_locked(&mut state) {
                        log::warn!(
                            "shard {}:{} background refresh failed: {e}",
                            shard.index_name, shard.shard_id
                        );
                    }
                }
            }
            _ = stop.stopped() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardql_core::value::Value;

    fn doc(i: i64) -> Row {
        let mut r = Row::new();
        r.set("i", Value::I64(i));
        r
    }

    async fn open_started(config: BatchConfig) -> (tempfile::TempDir, Arc<Shard>) {
        let dir = tempfile::tempdir().unwrap();
        let shard = Arc::new(Shard::open("idx", 0, dir.path(), true, config, None).unwrap());
        shard.start();
        (dir, shard)
    }

    #[tokio::test]
    async fn batch_commit_boundary() {
        let (_dir, shard) = open_started(BatchConfig {
            commit_batch_size: 1000,
            commit_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(10),
        })
        .await;

        for i in 0..999 {
            shard.index_document(&format!("{i}"), &doc(i)).unwrap();
        }
        let stats = shard.batch_stats();
        assert_eq!(stats.pending_docs, 999);
        assert!(stats.needs_commit);

        shard.index_document("999", &doc(999)).unwrap();
        let stats = shard.batch_stats();
        assert_eq!(stats.pending_docs, 0);
        assert!(!stats.needs_commit);
        assert!(stats.needs_refresh);

        shard.close().unwrap();
    }

    #[tokio::test]
    async fn explicit_flush_clears_both_flags() {
        let (_dir, shard) = open_started(BatchConfig {
            commit_batch_size: 1000,
            commit_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(10),
        })
        .await;

        for i in 0..10 {
            shard.index_document(&format!("{i}"), &doc(i)).unwrap();
        }
        shard.flush().unwrap();
        let stats = shard.batch_stats();
        assert_eq!(stats.pending_docs, 0);
        assert!(!stats.needs_commit);
        assert!(!stats.needs_refresh);

        shard.close().unwrap();
    }

    #[tokio::test]
    async fn background_refresher_runs_on_its_own_tick() {
        let (_dir, shard) = open_started(BatchConfig {
            commit_batch_size: 1000,
            commit_interval: Duration::from_millis(50),
            refresh_interval: Duration::from_millis(100),
        })
        .await;

        for i in 0..10 {
            shard.index_document(&format!("{i}"), &doc(i)).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(shard.batch_stats().pending_docs, 0);
        assert!(shard.batch_stats().needs_refresh);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!shard.batch_stats().needs_refresh);

        shard.close().unwrap();
    }

    #[tokio::test]
    async fn commit_batch_on_empty_pending_is_noop() {
        let (_dir, shard) = open_started(BatchConfig::default()).await;
        let mut state = shard.state.write();
        let before = state.last_commit_time;
        shard.commit_batch_locked(&mut state).unwrap();
        assert_eq!(state.last_commit_time, before);
        drop(state);
        shard.close().unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_dir, shard) = open_started(BatchConfig::default()).await;
        shard.close().unwrap();
        shard.close().unwrap();
    }

    #[tokio::test]
    async fn writes_rejected_once_closed() {
        let (_dir, shard) = open_started(BatchConfig::default()).await;
        shard.close().unwrap();
        let err = shard.index_document("1", &doc(1)).unwrap_err();
        assert!(matches!(err, CoreError::NotReady { .. }));
    }

    #[tokio::test]
    async fn not_durable_until_refresh() {
        let (_dir, shard) = open_started(BatchConfig {
            commit_batch_size: 1,
            commit_interval: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(10),
        })
        .await;
        shard.index_document("1", &doc(1)).unwrap();
        // committed synchronously (batch size 1) but not yet refreshed
        assert!(shard.get_document("1").unwrap().is_none());
        shard.flush().unwrap();
        assert!(shard.get_document("1").unwrap().is_some());
        shard.close().unwrap();
    }
}

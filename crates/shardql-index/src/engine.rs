//! The underlying full-text index is an opaque persistence/search engine
//! with a fixed interface (§6). This module defines that interface as a
//! trait so the shard core can be built and tested without a real engine
//! wired in, plus a small in-memory implementation — the equivalent of an
//! embedded "kv-mem" backend — used by tests and the CLI demo.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use shardql_core::value::Row;

/// An error surfaced by the underlying engine. The shard core wraps this in
/// [`shardql_core::CoreError::EngineFailure`] before returning it to callers.
#[derive(Debug)]
pub struct EngineError(pub String);

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for EngineError {}

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        EngineError(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// One hit from `handle.search`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub source: Row,
}

/// `searchResult{totalHits, hits[], maxScore, tookMillis}` (§6).
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub total_hits: u64,
    pub hits: Vec<SearchHit>,
    pub max_score: f32,
    pub took_millis: u64,
}

/// Operations the Shard requires from the underlying engine (§6). A real
/// implementation persists to `path`; `close` releases any held resources.
pub trait SearchEngine: Send + Sync {
    /// Buffered; not durable until `commit`.
    fn index_document(&self, id: &str, doc: &Row) -> EngineResult<()>;
    /// Durable.
    fn commit(&self) -> EngineResult<()>;
    /// Makes commits visible to `search`.
    fn refresh(&self) -> EngineResult<()>;
    /// Persist any ancillary log.
    fn flush(&self) -> EngineResult<()>;
    fn search(&self, query: &[u8], from: usize, size: usize) -> EngineResult<SearchResult>;
    fn get_document(&self, id: &str) -> EngineResult<Option<Row>>;
    fn delete_document(&self, id: &str) -> EngineResult<bool>;
    fn close(&self) -> EngineResult<()>;
}

/// Opens (or creates) an engine handle rooted at `path`. Swap this factory
/// for a real engine binding; the shard core only depends on [`SearchEngine`].
pub fn create_shard_engine(path: &Path) -> EngineResult<Box<dyn SearchEngine>> {
    Ok(Box::new(MemoryEngine::new(path)))
}

#[derive(Default)]
struct MemoryState {
    committed: HashMap<String, Row>,
    visible: HashMap<String, Row>,
}

/// A minimal in-memory engine: `index_document` buffers into `committed`,
/// `commit` is a no-op (already durable in memory), `refresh` copies
/// `committed` into `visible` so `search`/`get_document` only ever observe
/// what has been refreshed. This mirrors the commit-then-refresh visibility
/// split the shard core assumes without needing a real index library.
pub struct MemoryEngine {
    path: PathBuf,
    state: RwLock<MemoryState>,
}

impl MemoryEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SearchEngine for MemoryEngine {
    fn index_document(&self, id: &str, doc: &Row) -> EngineResult<()> {
        self.state
            .write()
            .committed
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    fn commit(&self) -> EngineResult<()> {
        // Already durable in this in-memory engine; nothing to flush to disk.
        Ok(())
    }

    fn refresh(&self) -> EngineResult<()> {
        let mut state = self.state.write();
        let committed = state.committed.clone();
        state.visible = committed;
        Ok(())
    }

    fn flush(&self) -> EngineResult<()> {
        Ok(())
    }

    fn search(&self, _query: &[u8], from: usize, size: usize) -> EngineResult<SearchResult> {
        let state = self.state.read();
        let mut hits: Vec<SearchHit> = state
            .visible
            .iter()
            .map(|(id, row)| SearchHit {
                id: id.clone(),
                score: 1.0,
                source: row.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        let total = hits.len() as u64;
        let page: Vec<SearchHit> = hits.drain(..).skip(from).take(size).collect();
        Ok(SearchResult {
            total_hits: total,
            max_score: if page.is_empty() { 0.0 } else { 1.0 },
            took_millis: 0,
            hits: page,
        })
    }

    fn get_document(&self, id: &str) -> EngineResult<Option<Row>> {
        Ok(self.state.read().visible.get(id).cloned())
    }

    fn delete_document(&self, id: &str) -> EngineResult<bool> {
        let mut state = self.state.write();
        let removed_committed = state.committed.remove(id).is_some();
        let removed_visible = state.visible.remove(id).is_some();
        Ok(removed_committed || removed_visible)
    }

    fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_visible_until_refresh() {
        let engine = MemoryEngine::new("/tmp/x");
        let mut row = Row::new();
        row.set("a", shardql_core::value::Value::I64(1));
        engine.index_document("1", &row).unwrap();
        engine.commit().unwrap();
        assert!(engine.get_document("1").unwrap().is_none());
        engine.refresh().unwrap();
        assert!(engine.get_document("1").unwrap().is_some());
    }

    #[test]
    fn search_paginates() {
        let engine = MemoryEngine::new("/tmp/x");
        for i in 0..5 {
            let mut row = Row::new();
            row.set("i", shardql_core::value::Value::I64(i));
            engine.index_document(&format!("{i:02}"), &row).unwrap();
        }
        engine.commit().unwrap();
        engine.refresh().unwrap();
        let page = engine.search(b"{}", 1, 2).unwrap();
        assert_eq!(page.total_hits, 5);
        assert_eq!(page.hits.len(), 2);
    }
}

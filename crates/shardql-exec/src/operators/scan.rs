//! `Scan` (§4.10, §6): the leaf operator of an operator tree. Wraps a query
//! already serialized to the engine's JSON-shaped search DSL (an opaque byte
//! buffer by the time it reaches here — building that buffer is the
//! planner's job, out of scope per §1) and pages through a shard's search
//! results, converting each hit into a [`Row`] by copying `_source` and
//! adding `_id`/`_score`.

use std::sync::Arc;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats as OpStats};
use shardql_core::value::{Row, Value, FIELD_ID, FIELD_SCORE};
use shardql_core::CoreResult;
use shardql_index::shard::{Shard, DEFAULT_PAGE_SIZE};

/// One page of a scan's underlying `handle.search(queryBytes, from, size)`
/// calls. Pages lazily: the first `Next` issues `from=0`, and the operator
/// re-issues subsequent pages only once the current one is exhausted.
pub struct Scan {
    shard: Arc<Shard>,
    query: Vec<u8>,
    page_size: usize,
    start_offset: usize,
    from: usize,
    total_hits: Option<u64>,
    page: std::vec::IntoIter<Row>,
    lifecycle: Lifecycle,
    stats: OpStats,
}

impl Scan {
    pub fn new(shard: Arc<Shard>, query: Vec<u8>, page_size: Option<usize>) -> Self {
        Self::with_offset(shard, query, page_size, 0)
    }

    /// Like [`Scan::new`] but begins paging at `start_offset` instead of the
    /// start of the result set, folding a plan's `from` directly into the
    /// leaf rather than skipping rows downstream.
    pub fn with_offset(
        shard: Arc<Shard>,
        query: Vec<u8>,
        page_size: Option<usize>,
        start_offset: usize,
    ) -> Self {
        Self {
            shard,
            query,
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            start_offset,
            from: start_offset,
            total_hits: None,
            page: Vec::new().into_iter(),
            lifecycle: Lifecycle::Initial,
            stats: OpStats::default(),
        }
    }

    fn fetch_next_page(&mut self) -> CoreResult<()> {
        let result = self.shard.search(&self.query, self.from, self.page_size)?;
        self.total_hits = Some(result.total_hits);
        self.from += result.hits.len();
        self.page = result
            .hits
            .into_iter()
            .map(|hit| {
                let mut row: Row = hit.source.into_map().into();
                row.set(FIELD_ID, Value::str(hit.id));
                row.set(FIELD_SCORE, Value::F64(hit.score as f64));
                row
            })
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }

    fn exhausted(&self) -> bool {
        matches!(self.total_hits, Some(total) if self.from as u64 >= total)
    }
}

impl Operator for Scan {
    fn open(&mut self, _ctx: &Context) -> CoreResult<()> {
        self.from = self.start_offset;
        self.total_hits = None;
        self.page = Vec::new().into_iter();
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            ctx.check()?;
            if let Some(row) = self.page.next() {
                self.stats.rows_read += 1;
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
            if self.total_hits.is_some() && self.exhausted() {
                return Ok(None);
            }
            self.fetch_next_page()?;
            if self.page.len() == 0 {
                return Ok(None);
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        Ok(())
    }

    fn stats(&self) -> OpStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardql_index::shard::BatchConfig;

    fn doc(i: i64) -> Row {
        let mut r = Row::new();
        r.set("i", Value::I64(i));
        r
    }

    #[tokio::test]
    async fn scans_all_committed_and_refreshed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let shard = Arc::new(
            Shard::open("idx", 0, dir.path(), true, BatchConfig::default(), None).unwrap(),
        );
        shard.start();
        for i in 0..5 {
            shard.index_document(&format!("{i}"), &doc(i)).unwrap();
        }
        shard.flush().unwrap();

        let mut op = Scan::new(shard.clone(), b"{}".to_vec(), Some(2));
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut count = 0;
        while let Some(row) = op.next(&ctx).unwrap() {
            assert!(row.contains(FIELD_ID));
            assert!(row.contains(FIELD_SCORE));
            count += 1;
        }
        assert_eq!(count, 5);
        op.close().unwrap();
        shard.close().unwrap();
    }

    #[tokio::test]
    async fn default_page_size_is_10000() {
        let dir = tempfile::tempdir().unwrap();
        let shard = Arc::new(
            Shard::open("idx", 0, dir.path(), true, BatchConfig::default(), None).unwrap(),
        );
        shard.start();
        let op = Scan::new(shard.clone(), b"{}".to_vec(), None);
        assert_eq!(op.page_size, DEFAULT_PAGE_SIZE);
        shard.close().unwrap();
    }
}

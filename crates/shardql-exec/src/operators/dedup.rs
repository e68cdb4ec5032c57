//! `Dedup(fields, count, consecutive)` (§4.5): key = tuple of
//! canonical-string field values. A row is emitted only while its key's
//! running count is below `count`. `consecutive = true` resets the key
//! table whenever the key changes, so only adjacent duplicates collapse;
//! otherwise the table spans the whole stream.

use rustc_hash::FxHashMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Dedup {
    child: Child,
    fields: Vec<String>,
    count: u64,
    consecutive: bool,
    seen: FxHashMap<Vec<String>, u64>,
    last_key: Option<Vec<String>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Dedup {
    pub fn new(child: Child, fields: Vec<String>, count: u64, consecutive: bool) -> Self {
        Self {
            child,
            fields,
            count: count.max(1),
            consecutive,
            seen: FxHashMap::default(),
            last_key: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn key(&self, row: &Row) -> Vec<String> {
        self.fields.iter().map(|f| row.get_value(f).canonical_string()).collect()
    }
}

impl Operator for Dedup {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.seen.clear();
        self.last_key = None;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            ctx.check()?;
            let Some(row) = self.child.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            let key = self.key(&row);
            if self.consecutive && self.last_key.as_ref() != Some(&key) {
                self.seen.clear();
            }
            self.last_key = Some(key.clone());
            let entry = self.seen.entry(key).or_insert(0);
            if *entry < self.count {
                *entry += 1;
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

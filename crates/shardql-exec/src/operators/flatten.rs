//! `Flatten` (§4.4): if the target field is a sequence, emits one row per
//! element (cloning the parent row and replacing the field with the
//! element); an empty sequence emits one row with the field set to null;
//! non-sequence values pass through unchanged. One input row can produce
//! many output rows, so a small pending queue sits between child pulls.

use std::collections::VecDeque;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Flatten {
    child: Child,
    field: String,
    pending: VecDeque<Row>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Flatten {
    pub fn new(child: Child, field: impl Into<String>) -> Self {
        Self {
            child,
            field: field.into(),
            pending: VecDeque::new(),
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn expand(&self, row: Row) -> Vec<Row> {
        let (value, present) = row.get(&self.field);
        if !present {
            return vec![row];
        }
        match value {
            Some(Value::Seq(items)) if !items.is_empty() => items
                .clone()
                .into_iter()
                .map(|item| {
                    let mut out = row.clone();
                    out.set(self.field.clone(), item);
                    out
                })
                .collect(),
            Some(Value::Seq(_)) => {
                let mut out = row.clone();
                out.set(self.field.clone(), Value::Null);
                vec![out]
            }
            _ => vec![row],
        }
    }
}

impl Operator for Flatten {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.pending.clear();
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            if let Some(row) = self.pending.pop_front() {
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
            ctx.check()?;
            let Some(row) = self.child.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            self.pending.extend(self.expand(row));
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

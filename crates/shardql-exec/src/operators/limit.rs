//! `Limit` (§4.4): count-bounded pass-through; signals end-of-stream once
//! `count` rows have been returned.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Limit {
    child: Child,
    count: u64,
    returned: u64,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Limit {
    pub fn new(child: Child, count: u64) -> Self {
        Self {
            child,
            count,
            returned: 0,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Limit {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.returned = 0;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        ctx.check()?;
        if self.returned >= self.count {
            return Ok(None);
        }
        match self.child.next(ctx)? {
            Some(row) => {
                self.stats.rows_read += 1;
                self.stats.rows_returned += 1;
                self.returned += 1;
                Ok(Some(row))
            }
            None => Ok(None),
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

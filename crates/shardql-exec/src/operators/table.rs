//! `Table` (§4.4): like include-mode Project, but a listed field absent
//! from the row is materialized as null instead of being omitted.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Table {
    child: Child,
    fields: Vec<String>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Table {
    pub fn new(child: Child, fields: Vec<String>) -> Self {
        Self {
            child,
            fields,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Table {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        ctx.check()?;
        let Some(row) = self.child.next(ctx)? else {
            return Ok(None);
        };
        self.stats.rows_read += 1;
        self.stats.rows_returned += 1;
        let mut out = Row::with_capacity(self.fields.len());
        for name in &self.fields {
            out.set(name.clone(), row.get_value(name));
        }
        Ok(Some(out))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

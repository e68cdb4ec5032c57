//! `Addcoltotals` (§4.6): streaming. Emits each row unchanged plus an
//! additional `labelField` (default "Total") holding the sum of that row's
//! numeric fields — or, when `fields` is given, the sum of just those
//! fields.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Addcoltotals {
    child: Child,
    fields: Vec<String>,
    label_field: String,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Addcoltotals {
    pub fn new(child: Child, fields: Vec<String>, label_field: Option<String>) -> Self {
        Self {
            child,
            fields,
            label_field: label_field.unwrap_or_else(|| "Total".to_string()),
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn sum(&self, row: &Row) -> f64 {
        if self.fields.is_empty() {
            row.iter().filter_map(|(_, v)| v.as_f64()).sum()
        } else {
            self.fields.iter().filter_map(|f| row.get_value(f).as_f64()).sum()
        }
    }
}

impl Operator for Addcoltotals {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        ctx.check()?;
        let Some(mut row) = self.child.next(ctx)? else {
            return Ok(None);
        };
        self.stats.rows_read += 1;
        let total = self.sum(&row);
        row.set(self.label_field.clone(), Value::F64(total));
        self.stats.rows_returned += 1;
        Ok(Some(row))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

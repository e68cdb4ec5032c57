//! `Reverse` (§4.5): materializing. Loads all rows, emits them in reverse
//! input order.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

pub struct Reverse {
    child: Child,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Reverse {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            rows: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Reverse {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.rows = None;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        if self.rows.is_none() {
            let mut rows = drain_all(self.child.as_mut(), ctx)?;
            self.stats.rows_read = rows.len() as u64;
            rows.reverse();
            self.rows = Some(rows.into_iter());
        }
        ctx.check()?;
        match self.rows.as_mut().unwrap().next() {
            Some(row) => {
                self.stats.rows_returned += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.rows = None;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::VecSource;
    use shardql_core::value::Value;

    #[test]
    fn emits_in_reverse_order() {
        let rows: Vec<Row> = (0..3)
            .map(|i| {
                let mut r = Row::new();
                r.set("i", Value::I64(i));
                r
            })
            .collect();
        let child = Box::new(VecSource::new(rows));
        let mut op = Reverse::new(child);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r.get_value("i"));
        }
        assert_eq!(out, vec![Value::I64(2), Value::I64(1), Value::I64(0)]);
        op.close().unwrap();
    }
}

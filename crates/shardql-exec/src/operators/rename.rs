//! `Rename` (§4.4): for each `(old, new)` pair, if `old` is present on the
//! row, move its value to `new` and delete `old`.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Rename {
    child: Child,
    pairs: Vec<(String, String)>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Rename {
    pub fn new(child: Child, pairs: Vec<(String, String)>) -> Self {
        Self {
            child,
            pairs,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Rename {
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
        for (old, new) in &self.pairs {
            if let Some(v) = row.delete(old) {
                row.set(new.clone(), v);
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::VecSource;
    use shardql_core::value::Value;

    #[test]
    fn moves_value_and_deletes_old() {
        let mut r = Row::new();
        r.set("a", Value::I64(1));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Rename::new(child, vec![("a".to_string(), "b".to_string())]);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(!out.contains("a"));
        assert_eq!(out.get_value("b"), Value::I64(1));
        op.close().unwrap();
    }

    #[test]
    fn missing_old_field_is_noop() {
        let r = Row::new();
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Rename::new(child, vec![("missing".to_string(), "b".to_string())]);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(!out.contains("b"));
        op.close().unwrap();
    }
}

//! `Filter` (§4.4): passes rows for which `condition` evaluates truthy.
//! Evaluation errors drop the row and are logged; they are not fatal.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::expr::{eval, truthy, Expr};
use crate::operators::Child;

pub struct Filter {
    child: Child,
    condition: Expr,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Filter {
    pub fn new(child: Child, condition: Expr) -> Self {
        Self {
            child,
            condition,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Filter {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
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
            match eval(&self.condition, &row) {
                Ok(v) if truthy(&v) => {
                    self.stats.rows_returned += 1;
                    return Ok(Some(row));
                }
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("filter: evaluation error, dropping row: {e}");
                    continue;
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::VecSource;
    use shardql_core::value::Value;

    #[test]
    fn keeps_rows_that_evaluate_truthy() {
        let mut r1 = Row::new();
        r1.set("n", Value::I64(1));
        let mut r2 = Row::new();
        r2.set("n", Value::I64(0));
        let child = Box::new(VecSource::new(vec![r1, r2]));
        let mut op = Filter::new(child, Expr::field("n"));
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        assert_eq!(op.next(&ctx).unwrap().unwrap().get_value("n"), Value::I64(1));
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }

    #[test]
    fn evaluation_error_drops_row_without_failing() {
        let mut r = Row::new();
        r.set("n", Value::I64(1));
        let child = Box::new(VecSource::new(vec![r]));
        let bad = Expr::Call("nope".to_string(), vec![]);
        let mut op = Filter::new(child, bad);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }
}

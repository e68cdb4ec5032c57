//! `Eval` (§4.4): evaluates each assignment in order against the row being
//! built, adding or overwriting the target field. An error in one
//! assignment skips only that assignment; the row still flows through.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::expr::{eval, Expr};
use crate::operators::Child;

pub struct Eval {
    child: Child,
    assignments: Vec<(String, Expr)>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Eval {
    pub fn new(child: Child, assignments: Vec<(String, Expr)>) -> Self {
        Self {
            child,
            assignments,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Eval {
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
        for (target, expr) in &self.assignments {
            match eval(expr, &row) {
                Ok(v) => row.set(target.clone(), v),
                Err(e) => log::warn!("eval: assignment to {target} failed, skipping: {e}"),
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
    use crate::expr::BinaryOp;
    use crate::operators::test_support::VecSource;
    use shardql_core::value::Value;

    #[test]
    fn assignments_apply_in_order() {
        let mut r = Row::new();
        r.set("a", Value::I64(1));
        let child = Box::new(VecSource::new(vec![r]));
        let assignments = vec![
            ("b".to_string(), Expr::field("a")),
            (
                "c".to_string(),
                Expr::Binary(BinaryOp::Add, Box::new(Expr::field("b")), Box::new(Expr::lit(1i64))),
            ),
        ];
        let mut op = Eval::new(child, assignments);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("b"), Value::I64(1));
        assert_eq!(out.get_value("c"), Value::F64(2.0));
        op.close().unwrap();
    }

    #[test]
    fn errored_assignment_is_skipped_others_still_apply() {
        let r = Row::new();
        let child = Box::new(VecSource::new(vec![r]));
        let assignments = vec![
            ("bad".to_string(), Expr::Call("nope".to_string(), vec![])),
            ("good".to_string(), Expr::lit(5i64)),
        ];
        let mut op = Eval::new(child, assignments);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(!out.contains("bad"));
        assert_eq!(out.get_value("good"), Value::I64(5));
        op.close().unwrap();
    }
}

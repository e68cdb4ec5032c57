//! Subquery executor (§4.7): materializes a subsearch eagerly (up to a cap)
//! and turns the correlated-looking `IN`/`EXISTS`/scalar constructs into an
//! uncorrelated filter over the main pipeline. Correlated subqueries are an
//! explicit non-goal (§9).
//!
//! [`SubqueryExecutor`] owns the shared drain-and-cap step; [`InFilter`],
//! [`ExistsFilter`], and [`ScalarFilter`] are the three operators built on
//! top of it.

use std::collections::HashSet;

use shardql_core::error::CoreError;
use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::{drain_capped, Child};

/// Default materialization cap (§4.7): drain the subsearch up to this many
/// rows, logging a warning on cap hit.
pub const DEFAULT_SUBQUERY_CAP: usize = 10_000;

/// Drains a subsearch operator once, retaining its materialized rows.
pub struct SubqueryExecutor {
    cap: usize,
}

impl SubqueryExecutor {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    pub fn materialize(&self, mut sub: Child, ctx: &Context) -> CoreResult<Vec<Row>> {
        sub.open(ctx)?;
        let rows = drain_capped(sub.as_mut(), ctx, self.cap);
        let close_err = sub.close().err();
        let rows = rows?;
        if let Some(e) = close_err {
            return Err(e);
        }
        Ok(rows)
    }
}

impl Default for SubqueryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SUBQUERY_CAP)
    }
}

/// Numeric normalization used to build the `IN` hash set (§4.7): ints widen
/// to i64's canonical-string form via f64, floats widen to f64 — i.e. `1`
/// and `1.0` hash to the same key. Non-numeric values fall back to their
/// canonical string.
fn normalize_key(v: &Value) -> String {
    match v.as_f64() {
        Some(f) => f.to_string(),
        None => v.canonical_string(),
    }
}

/// `IN` / `NOT IN(field)` (§4.7): builds a hash set over the subquery's
/// `field` values once at `Open`. Per main row: a missing field drops the
/// row; otherwise it passes iff `set.contains(key) XOR negate`.
pub struct InFilter {
    main: Child,
    sub: Option<Child>,
    field: String,
    negate: bool,
    executor: SubqueryExecutor,
    set: HashSet<String>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl InFilter {
    pub fn new(main: Child, sub: Child, field: impl Into<String>, negate: bool) -> Self {
        Self {
            main,
            sub: Some(sub),
            field: field.into(),
            negate,
            executor: SubqueryExecutor::default(),
            set: HashSet::new(),
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for InFilter {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        let sub = self.sub.take().expect("open called once");
        let rows = self.executor.materialize(sub, ctx)?;
        self.set = rows
            .iter()
            .filter_map(|r| {
                let (v, present) = r.get(&self.field);
                present.then(|| normalize_key(v.expect("present")))
            })
            .collect();
        self.main.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            ctx.check()?;
            let Some(row) = self.main.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            let (value, present) = row.get(&self.field);
            if !present {
                continue;
            }
            let member = self.set.contains(&normalize_key(value.expect("present")));
            if member != self.negate {
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.main.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

/// `EXISTS` / `NOT EXISTS` (§4.7): a single `hasResults` boolean decided at
/// `Open`. If `hasResults XOR negate`, passes every main row; otherwise
/// emits nothing.
pub struct ExistsFilter {
    main: Child,
    sub: Option<Child>,
    negate: bool,
    executor: SubqueryExecutor,
    pass_through: bool,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl ExistsFilter {
    pub fn new(main: Child, sub: Child, negate: bool) -> Self {
        Self {
            main,
            sub: Some(sub),
            negate,
            executor: SubqueryExecutor::default(),
            pass_through: false,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for ExistsFilter {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        let sub = self.sub.take().expect("open called once");
        let rows = self.executor.materialize(sub, ctx)?;
        let has_results = !rows.is_empty();
        self.pass_through = has_results != self.negate;
        self.main.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        if !self.pass_through {
            return Ok(None);
        }
        ctx.check()?;
        match self.main.next(ctx)? {
            Some(row) => {
                self.stats.rows_read += 1;
                self.stats.rows_returned += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.main.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ScalarOp {
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(CoreError::invalid(format!("unknown scalar operator: {other}"))),
        }
    }
}

/// `Scalar(field, op)` (§4.7): the subquery must materialize to exactly one
/// row with exactly one field — otherwise the subquery is invalid and no
/// rows are emitted. Non-numeric scalars only support `=`/`!=`.
pub struct ScalarFilter {
    main: Child,
    sub: Option<Child>,
    field: String,
    op: ScalarOp,
    executor: SubqueryExecutor,
    scalar: Option<Value>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl ScalarFilter {
    pub fn new(main: Child, sub: Child, field: impl Into<String>, op: ScalarOp) -> Self {
        Self {
            main,
            sub: Some(sub),
            field: field.into(),
            op,
            executor: SubqueryExecutor::default(),
            scalar: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn compare(&self, left: &Value, right: &Value) -> bool {
        let both_numeric = left.as_f64().is_some() && right.as_f64().is_some();
        match self.op {
            ScalarOp::Eq => left.numeric_eq(right),
            ScalarOp::Ne => !left.numeric_eq(right),
            ScalarOp::Lt if both_numeric => left.compare(right) == std::cmp::Ordering::Less,
            ScalarOp::Le if both_numeric => left.compare(right) != std::cmp::Ordering::Greater,
            ScalarOp::Gt if both_numeric => left.compare(right) == std::cmp::Ordering::Greater,
            ScalarOp::Ge if both_numeric => left.compare(right) != std::cmp::Ordering::Less,
            _ => false,
        }
    }
}

impl Operator for ScalarFilter {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        let sub = self.sub.take().expect("open called once");
        let rows = self.executor.materialize(sub, ctx)?;
        self.scalar = if rows.len() == 1 && rows[0].len() == 1 {
            rows[0].iter().next().map(|(_, v)| v.clone())
        } else {
            None
        };
        self.main.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        let Some(scalar) = self.scalar.clone() else {
            return Ok(None);
        };
        loop {
            ctx.check()?;
            let Some(row) = self.main.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            let value = row.get_value(&self.field);
            if self.compare(&value, &scalar) {
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.main.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::VecSource;

    fn row_with(field: &str, v: Value) -> Row {
        let mut r = Row::new();
        r.set(field, v);
        r
    }

    #[test]
    fn in_filter_keeps_membership_matches() {
        let main = Box::new(VecSource::new(vec![
            row_with("id", Value::I64(1)),
            row_with("id", Value::I64(2)),
            row_with("id", Value::I64(3)),
        ]));
        let sub = Box::new(VecSource::new(vec![
            row_with("id", Value::I64(1)),
            row_with("id", Value::I64(3)),
        ]));
        let mut op = InFilter::new(main, sub, "id", false);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut ids = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            ids.push(r.get_value("id"));
        }
        assert_eq!(ids, vec![Value::I64(1), Value::I64(3)]);
        op.close().unwrap();
    }

    #[test]
    fn not_in_negates_membership() {
        let main = Box::new(VecSource::new(vec![
            row_with("id", Value::I64(1)),
            row_with("id", Value::I64(2)),
        ]));
        let sub = Box::new(VecSource::new(vec![row_with("id", Value::I64(1))]));
        let mut op = InFilter::new(main, sub, "id", true);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("id"), Value::I64(2));
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }

    #[test]
    fn in_filter_widens_int_and_float_to_the_same_key() {
        let main = Box::new(VecSource::new(vec![row_with("id", Value::I64(1))]));
        let sub = Box::new(VecSource::new(vec![row_with("id", Value::F64(1.0))]));
        let mut op = InFilter::new(main, sub, "id", false);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        assert!(op.next(&ctx).unwrap().is_some());
        op.close().unwrap();
    }

    #[test]
    fn exists_passes_all_rows_when_subquery_has_results() {
        let main = Box::new(VecSource::new(vec![row_with("id", Value::I64(1)), row_with("id", Value::I64(2))]));
        let sub = Box::new(VecSource::new(vec![row_with("anything", Value::Bool(true))]));
        let mut op = ExistsFilter::new(main, sub, false);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut count = 0;
        while op.next(&ctx).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        op.close().unwrap();
    }

    #[test]
    fn not_exists_emits_nothing_when_subquery_has_results() {
        let main = Box::new(VecSource::new(vec![row_with("id", Value::I64(1))]));
        let sub = Box::new(VecSource::new(vec![row_with("anything", Value::Bool(true))]));
        let mut op = ExistsFilter::new(main, sub, true);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }

    #[test]
    fn scalar_greater_than_threshold() {
        let main = Box::new(VecSource::new(vec![
            row_with("rev", Value::I64(100)),
            row_with("rev", Value::I64(200)),
            row_with("rev", Value::I64(300)),
        ]));
        let sub = Box::new(VecSource::new(vec![row_with("threshold", Value::I64(150))]));
        let mut op = ScalarFilter::new(main, sub, "rev", ScalarOp::Gt);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut revs = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            revs.push(r.get_value("rev"));
        }
        assert_eq!(revs, vec![Value::I64(200), Value::I64(300)]);
        op.close().unwrap();
    }

    #[test]
    fn scalar_with_multi_row_subquery_is_invalid_and_emits_nothing() {
        let main = Box::new(VecSource::new(vec![row_with("rev", Value::I64(100))]));
        let sub = Box::new(VecSource::new(vec![
            row_with("threshold", Value::I64(1)),
            row_with("threshold", Value::I64(2)),
        ]));
        let mut op = ScalarFilter::new(main, sub, "rev", ScalarOp::Gt);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }
}

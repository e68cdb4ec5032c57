//! `Streamstats` (§4.6): a streaming pass that computes per-group running
//! aggregates and emits each row enriched with them as it passes through
//! (no buffering of the whole input, unlike `stats`/`eventstats`).
//!
//! `window = 0` means unbounded running aggregates; `window > 0` keeps only
//! the last `window` values per group per aggregation and recomputes
//! min/max/avg/sum/count over that rolling set. `resetBefore`/`resetAfter`
//! (declared but unimplemented in the source system, §9 open question) are
//! resolved here as: evaluate the reset condition against the row, and if it
//! is truthy, clear the row's group's state before (resetBefore) or after
//! (resetAfter) emitting the triggering row.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats as OpStats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::expr::{eval, truthy, Expr};
use crate::operators::agg::{group_key, AggFunc, AggSpec};
use crate::operators::Child;

/// Rolling per-group, per-aggregation window. `window = 0` never evicts.
#[derive(Default)]
struct RunningAgg {
    window: usize,
    values: VecDeque<Value>,
    count: u64,
    sum: f64,
}

impl RunningAgg {
    fn new(window: usize) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    fn push(&mut self, func: AggFunc, value: Option<&Value>) {
        if func == AggFunc::Count {
            if self.window > 0 && self.values.len() >= self.window {
                self.values.pop_front();
                self.count = self.count.saturating_sub(1);
            }
            self.count += 1;
            self.values.push_back(Value::Null);
            return;
        }
        let Some(value) = value else { return };
        if value.is_null() {
            return;
        }
        if self.window > 0 && self.values.len() >= self.window {
            if let Some(evicted) = self.values.pop_front() {
                if let Some(f) = evicted.as_f64() {
                    self.sum -= f;
                }
                self.count = self.count.saturating_sub(1);
            }
        }
        if let Some(f) = value.as_f64() {
            self.sum += f;
        }
        self.count += 1;
        self.values.push_back(value.clone());
    }

    fn finalize(&self, func: AggFunc) -> Value {
        match func {
            AggFunc::Count => Value::I64(self.count as i64),
            AggFunc::Sum => Value::F64(self.sum),
            AggFunc::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::F64(self.sum / self.count as f64)
                }
            }
            AggFunc::Min => self
                .values
                .iter()
                .filter(|v| !v.is_null())
                .min_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(Value::Null),
            AggFunc::Max => self
                .values
                .iter()
                .filter(|v| !v.is_null())
                .max_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(Value::Null),
            AggFunc::DistinctCount => {
                let mut seen = std::collections::HashSet::new();
                for v in &self.values {
                    if !v.is_null() {
                        seen.insert(v.canonical_string());
                    }
                }
                Value::I64(seen.len() as i64)
            }
        }
    }

    fn reset(&mut self) {
        self.values.clear();
        self.count = 0;
        self.sum = 0.0;
    }
}

pub struct Streamstats {
    child: Child,
    window: usize,
    group_by: Vec<String>,
    aggs: Vec<AggSpec>,
    reset_before: Option<Expr>,
    reset_after: Option<Expr>,
    groups: FxHashMap<Vec<String>, Vec<RunningAgg>>,
    lifecycle: Lifecycle,
    stats: OpStats,
}

impl Streamstats {
    pub fn new(
        child: Child,
        window: usize,
        group_by: Vec<String>,
        aggs: Vec<AggSpec>,
        reset_before: Option<Expr>,
        reset_after: Option<Expr>,
    ) -> Self {
        Self {
            child,
            window,
            group_by,
            aggs,
            reset_before,
            reset_after,
            groups: FxHashMap::default(),
            lifecycle: Lifecycle::Initial,
            stats: OpStats::default(),
        }
    }

    fn evaluates_truthy(expr: &Expr, row: &Row) -> bool {
        eval(expr, row).map(|v| truthy(&v)).unwrap_or(false)
    }
}

impl Operator for Streamstats {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.groups.clear();
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

        let key = group_key(&row, &self.group_by);

        if let Some(expr) = &self.reset_before {
            if Self::evaluates_truthy(expr, &row) {
                self.groups.remove(&key);
            }
        }

        let aggs = &self.aggs;
        let accs = self
            .groups
            .entry(key.clone())
            .or_insert_with(|| aggs.iter().map(|_| RunningAgg::new(self.window)).collect());
        for (spec, acc) in aggs.iter().zip(accs.iter_mut()) {
            let value = spec.field.as_ref().map(|f| row.get_value(f));
            acc.push(spec.func, value.as_ref());
            row.set(spec.alias.clone(), acc.finalize(spec.func));
        }

        if let Some(expr) = &self.reset_after {
            if Self::evaluates_truthy(expr, &row) {
                self.groups.remove(&key);
            }
        }

        self.stats.rows_returned += 1;
        Ok(Some(row))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.groups.clear();
        self.child.close()
    }

    fn stats(&self) -> OpStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::agg::AggFunc;
    use crate::operators::test_support::VecSource;

    fn row(v: i64) -> Row {
        let mut r = Row::new();
        r.set("v", Value::I64(v));
        r
    }

    #[test]
    fn unbounded_running_sum() {
        let child = Box::new(VecSource::new(vec![row(10), row(20), row(30), row(40)]));
        let mut op = Streamstats::new(
            child,
            0,
            vec![],
            vec![AggSpec::new(
                AggFunc::Sum,
                Some("v".to_string()),
                Some("running_sum".to_string()),
            )],
            None,
            None,
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut sums = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            sums.push(r.get_value("running_sum"));
        }
        assert_eq!(
            sums,
            vec![
                Value::F64(10.0),
                Value::F64(30.0),
                Value::F64(60.0),
                Value::F64(100.0)
            ]
        );
        op.close().unwrap();
    }

    #[test]
    fn windowed_avg() {
        let child = Box::new(VecSource::new(vec![row(10), row(20), row(30), row(40)]));
        let mut op = Streamstats::new(
            child,
            2,
            vec![],
            vec![AggSpec::new(
                AggFunc::Avg,
                Some("v".to_string()),
                Some("avg_v".to_string()),
            )],
            None,
            None,
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut avgs = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            avgs.push(r.get_value("avg_v"));
        }
        assert_eq!(
            avgs,
            vec![
                Value::F64(10.0),
                Value::F64(15.0),
                Value::F64(25.0),
                Value::F64(35.0)
            ]
        );
        op.close().unwrap();
    }

    #[test]
    fn windowed_count_reports_rolling_window_size_not_a_running_total() {
        let child = Box::new(VecSource::new(vec![row(1), row(2), row(3), row(4), row(5)]));
        let mut op = Streamstats::new(
            child,
            3,
            vec![],
            vec![AggSpec::new(
                AggFunc::Count,
                None,
                Some("running_count".to_string()),
            )],
            None,
            None,
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut counts = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            counts.push(r.get_value("running_count"));
        }
        // window=3: grows to 3 then holds steady, never exceeding the window.
        assert_eq!(
            counts,
            vec![
                Value::I64(1),
                Value::I64(2),
                Value::I64(3),
                Value::I64(3),
                Value::I64(3),
            ]
        );
        op.close().unwrap();
    }

    #[test]
    fn reset_after_clears_group_state_following_the_triggering_row() {
        let child = Box::new(VecSource::new(vec![row(10), row(20), row(30)]));
        let reset_after = Expr::Binary(
            crate::expr::BinaryOp::Eq,
            Box::new(Expr::field("v")),
            Box::new(Expr::lit(20i64)),
        );
        let mut op = Streamstats::new(
            child,
            0,
            vec![],
            vec![AggSpec::new(
                AggFunc::Sum,
                Some("v".to_string()),
                Some("running_sum".to_string()),
            )],
            None,
            Some(reset_after),
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let r1 = op.next(&ctx).unwrap().unwrap();
        assert_eq!(r1.get_value("running_sum"), Value::F64(10.0));
        let r2 = op.next(&ctx).unwrap().unwrap();
        assert_eq!(r2.get_value("running_sum"), Value::F64(30.0));
        let r3 = op.next(&ctx).unwrap().unwrap();
        // group reset after row 2 (v=20), so row 3 starts a fresh running sum
        assert_eq!(r3.get_value("running_sum"), Value::F64(30.0));
        op.close().unwrap();
    }
}

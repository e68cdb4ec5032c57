//! `Eventstats` (§4.6): reads all rows, groups as `stats` does, computes
//! aggregates, then emits each original row enriched with its group's
//! aggregates. Input order is preserved.

use rustc_hash::FxHashMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats as OpStats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::agg::{group_key, AggSpec, Accumulator};
use crate::operators::{drain_all, Child};

pub struct Eventstats {
    child: Child,
    group_by: Vec<String>,
    aggs: Vec<AggSpec>,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: OpStats,
}

impl Eventstats {
    pub fn new(child: Child, group_by: Vec<String>, aggs: Vec<AggSpec>) -> Self {
        Self {
            child,
            group_by,
            aggs,
            rows: None,
            lifecycle: Lifecycle::Initial,
            stats: OpStats::default(),
        }
    }

    fn build(&self, input: Vec<Row>) -> Vec<Row> {
        let mut groups: FxHashMap<Vec<String>, Vec<Accumulator>> = FxHashMap::default();
        for row in &input {
            let key = group_key(row, &self.group_by);
            let accs = groups
                .entry(key)
                .or_insert_with(|| vec![Accumulator::default(); self.aggs.len()]);
            for (spec, acc) in self.aggs.iter().zip(accs.iter_mut()) {
                let value = spec.field.as_ref().map(|f| row.get_value(f));
                acc.add_row(spec.func, value.as_ref());
            }
        }
        input
            .into_iter()
            .map(|mut row| {
                let key = group_key(&row, &self.group_by);
                if let Some(accs) = groups.get(&key) {
                    for (spec, acc) in self.aggs.iter().zip(accs.iter()) {
                        row.set(spec.alias.clone(), acc.finalize(spec.func));
                    }
                }
                row
            })
            .collect()
    }
}

impl Operator for Eventstats {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.rows = None;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        if self.rows.is_none() {
            let input = drain_all(self.child.as_mut(), ctx)?;
            self.stats.rows_read = input.len() as u64;
            self.rows = Some(self.build(input).into_iter());
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

    fn stats(&self) -> OpStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::agg::AggFunc;
    use crate::operators::test_support::VecSource;
    use shardql_core::value::Value;

    fn row(host: &str, latency: i64) -> Row {
        let mut r = Row::new();
        r.set("host", Value::str(host));
        r.set("latency", Value::I64(latency));
        r
    }

    #[test]
    fn enriches_each_row_with_its_group_aggregate() {
        let child = Box::new(VecSource::new(vec![row("s1", 50), row("s1", 100), row("s2", 1)]));
        let mut op = Eventstats::new(
            child,
            vec!["host".to_string()],
            vec![AggSpec::new(
                AggFunc::Avg,
                Some("latency".to_string()),
                Some("avg_latency".to_string()),
            )],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let r1 = op.next(&ctx).unwrap().unwrap();
        assert_eq!(r1.get_value("avg_latency"), Value::F64(75.0));
        let r2 = op.next(&ctx).unwrap().unwrap();
        assert_eq!(r2.get_value("avg_latency"), Value::F64(75.0));
        let r3 = op.next(&ctx).unwrap().unwrap();
        assert_eq!(r3.get_value("avg_latency"), Value::F64(1.0));
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }
}

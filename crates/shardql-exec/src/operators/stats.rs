//! `Stats` (§4.6): materializing aggregation. With `group_by`, hashes the
//! group-key tuple and maintains one [`Accumulator`] set per group; without
//! it, a single global accumulator set. The output row carries the group-by
//! field values plus each aggregation under its alias.

use indexmap::IndexMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats as OpStats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::agg::{group_key, AggSpec, Accumulator};
use crate::operators::{drain_all, Child};

pub struct Aggregation {
    child: Child,
    group_by: Vec<String>,
    aggs: Vec<AggSpec>,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: OpStats,
}

impl Aggregation {
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
        let mut groups: IndexMap<Vec<String>, (Vec<String>, Vec<Accumulator>)> = IndexMap::new();
        for row in &input {
            let key = group_key(row, &self.group_by);
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                (key.clone(), vec![Accumulator::default(); self.aggs.len()])
            });
            for (spec, acc) in self.aggs.iter().zip(entry.1.iter_mut()) {
                let value = spec.field.as_ref().map(|f| row.get_value(f));
                acc.add_row(spec.func, value.as_ref());
            }
        }
        groups
            .into_values()
            .map(|(key, accs)| {
                let mut out = Row::with_capacity(self.group_by.len() + self.aggs.len());
                for (name, value) in self.group_by.iter().zip(key) {
                    out.set(name.clone(), shardql_core::value::Value::Str(value));
                }
                for (spec, acc) in self.aggs.iter().zip(accs.iter()) {
                    out.set(spec.alias.clone(), acc.finalize(spec.func));
                }
                out
            })
            .collect()
    }
}

impl Operator for Aggregation {
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

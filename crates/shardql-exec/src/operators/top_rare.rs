//! `Top` / `Rare` (§4.5): materializing. Counts occurrences of the
//! field-tuple key across all input, sorts descending (Top) or ascending
//! (Rare), and emits the first `limit` with a `count` field (and optionally
//! a `percent` = count/total*100).

use indexmap::IndexMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopRareMode {
    Top,
    Rare,
}

pub struct TopRare {
    child: Child,
    fields: Vec<String>,
    mode: TopRareMode,
    limit: usize,
    show_percent: bool,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl TopRare {
    pub fn new(
        child: Child,
        fields: Vec<String>,
        mode: TopRareMode,
        limit: usize,
        show_percent: bool,
    ) -> Self {
        Self {
            child,
            fields,
            mode,
            limit,
            show_percent,
            rows: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn key(&self, row: &Row) -> Vec<String> {
        self.fields.iter().map(|f| row.get_value(f).canonical_string()).collect()
    }

    fn build(&self, input: Vec<Row>) -> Vec<Row> {
        let mut counts: IndexMap<Vec<String>, (Row, u64)> = IndexMap::new();
        for row in input {
            let key = self.key(&row);
            let entry = counts
                .entry(key)
                .or_insert_with(|| (row.clone(), 0));
            entry.1 += 1;
        }
        let total: u64 = counts.values().map(|(_, c)| *c).sum();
        let mut entries: Vec<(Row, u64)> = counts.into_values().collect();
        entries.sort_by(|a, b| match self.mode {
            TopRareMode::Top => b.1.cmp(&a.1),
            TopRareMode::Rare => a.1.cmp(&b.1),
        });
        entries
            .into_iter()
            .take(self.limit)
            .map(|(template, count)| {
                let mut out = Row::with_capacity(self.fields.len() + 2);
                for f in &self.fields {
                    out.set(f.clone(), template.get_value(f));
                }
                out.set("count", Value::I64(count as i64));
                if self.show_percent {
                    let pct = if total == 0 { 0.0 } else { (count as f64 / total as f64) * 100.0 };
                    out.set("percent", Value::F64(pct));
                }
                out
            })
            .collect()
    }
}

impl Operator for TopRare {
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

    fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::VecSource;

    fn row(host: &str) -> Row {
        let mut r = Row::new();
        r.set("host", Value::str(host));
        r
    }

    #[test]
    fn top_orders_by_descending_count() {
        let child = Box::new(VecSource::new(vec![
            row("a"), row("b"), row("a"), row("a"), row("b"),
        ]));
        let mut op = TopRare::new(child, vec!["host".to_string()], TopRareMode::Top, 10, false);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let first = op.next(&ctx).unwrap().unwrap();
        assert_eq!(first.get_value("host"), Value::str("a"));
        assert_eq!(first.get_value("count"), Value::I64(3));
        op.close().unwrap();
    }

    #[test]
    fn rare_orders_ascending_and_respects_limit() {
        let child = Box::new(VecSource::new(vec![
            row("a"), row("b"), row("a"), row("a"), row("b"), row("c"),
        ]));
        let mut op = TopRare::new(child, vec!["host".to_string()], TopRareMode::Rare, 1, false);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let first = op.next(&ctx).unwrap().unwrap();
        assert_eq!(first.get_value("host"), Value::str("c"));
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }

    #[test]
    fn percent_computed_over_total() {
        let child = Box::new(VecSource::new(vec![row("a"), row("a"), row("b")]));
        let mut op = TopRare::new(child, vec!["host".to_string()], TopRareMode::Top, 10, true);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let first = op.next(&ctx).unwrap().unwrap();
        assert_eq!(first.get_value("percent"), Value::F64(200.0 / 3.0));
        op.close().unwrap();
    }
}

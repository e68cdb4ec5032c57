//! `Sort` (§4.5): materializing. Loads all rows at the first `Next`, stable
//! sorts by a list of keys each with its own ascending/descending order.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

pub struct Sort {
    child: Child,
    keys: Vec<SortKey>,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Sort {
    pub fn new(child: Child, keys: Vec<SortKey>) -> Self {
        Self {
            child,
            keys,
            rows: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Sort {
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
            rows.sort_by(|a, b| {
                for key in &self.keys {
                    let ord = a.get_value(&key.field).compare(&b.get_value(&key.field));
                    let ord = if key.ascending { ord } else { ord.reverse() };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
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

    fn row(n: i64) -> Row {
        let mut r = Row::new();
        r.set("n", Value::I64(n));
        r
    }

    #[test]
    fn sorts_ascending_by_default() {
        let child = Box::new(VecSource::new(vec![row(3), row(1), row(2)]));
        let mut op = Sort::new(
            child,
            vec![SortKey {
                field: "n".to_string(),
                ascending: true,
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r.get_value("n"));
        }
        assert_eq!(out, vec![Value::I64(1), Value::I64(2), Value::I64(3)]);
        op.close().unwrap();
    }

    #[test]
    fn sorts_descending() {
        let child = Box::new(VecSource::new(vec![row(3), row(1), row(2)]));
        let mut op = Sort::new(
            child,
            vec![SortKey {
                field: "n".to_string(),
                ascending: false,
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r.get_value("n"));
        }
        assert_eq!(out, vec![Value::I64(3), Value::I64(2), Value::I64(1)]);
        op.close().unwrap();
    }
}

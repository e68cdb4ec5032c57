//! `Fillnull` (§4.4): replaces null values with a fixed literal, optionally
//! scoped to a field list (else every field present on the row). A listed
//! field absent from the row is created with the fill value.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Fillnull {
    child: Child,
    fields: Option<Vec<String>>,
    value: Value,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Fillnull {
    pub fn new(child: Child, fields: Option<Vec<String>>, value: Value) -> Self {
        Self {
            child,
            fields,
            value,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Fillnull {
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
        match &self.fields {
            Some(fields) => {
                for name in fields {
                    let (v, present) = row.get(name);
                    if !present || v.map(Value::is_null).unwrap_or(false) {
                        row.set(name.clone(), self.value.clone());
                    }
                }
            }
            None => {
                let targets: Vec<String> = row
                    .iter()
                    .filter(|(_, v)| v.is_null())
                    .map(|(k, _)| k.to_string())
                    .collect();
                for name in targets {
                    row.set(name, self.value.clone());
                }
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

    #[test]
    fn fills_null_fields_across_whole_row() {
        let mut r = Row::new();
        r.set("a", Value::Null);
        r.set("b", Value::I64(1));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Fillnull::new(child, None, Value::str("NA"));
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("a"), Value::str("NA"));
        assert_eq!(out.get_value("b"), Value::I64(1));
        op.close().unwrap();
    }

    #[test]
    fn listed_field_absent_is_created() {
        let r = Row::new();
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Fillnull::new(child, Some(vec!["missing".to_string()]), Value::I64(0));
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("missing"), Value::I64(0));
        op.close().unwrap();
    }
}

//! `Addtotals` (§4.6): combines row-total and column-total behavior.
//!
//! - `row=true` adds `fieldName` (default "total") = that row's numeric sum
//!   (of `fields` if given, else every numeric field). Streaming.
//! - `col=true` buffers all input, then appends one trailing summary row
//!   whose numeric fields hold column totals. The label goes into
//!   `labelField` if set, else the first non-numeric field seen, else
//!   `_total`. If both `row` and `col` are true, the summary row's
//!   `fieldName` equals the sum of the per-row totals.
//! - Both false: pass-through.

use indexmap::IndexSet;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

pub struct Addtotals {
    child: Child,
    row: bool,
    col: bool,
    fields: Vec<String>,
    label_field: Option<String>,
    label: String,
    field_name: String,
    buffered: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Addtotals {
    pub fn new(
        child: Child,
        row: bool,
        col: bool,
        fields: Vec<String>,
        label_field: Option<String>,
        label: Option<String>,
        field_name: Option<String>,
    ) -> Self {
        Self {
            child,
            row,
            col,
            fields,
            label_field,
            label: label.unwrap_or_else(|| "Total".to_string()),
            field_name: field_name.unwrap_or_else(|| "total".to_string()),
            buffered: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn row_sum(&self, row: &Row) -> f64 {
        if self.fields.is_empty() {
            row.iter().filter_map(|(_, v)| v.as_f64()).sum()
        } else {
            self.fields.iter().filter_map(|f| row.get_value(f).as_f64()).sum()
        }
    }

    /// Builds the trailing column-summary row: numeric field names (a union
    /// across all input rows, first-seen order) sum column-wise; the label
    /// lands in `labelField` if set, else the first non-numeric field of the
    /// first row, else `_total`. When `row` is also true, `fieldName` holds
    /// the sum of every per-row total already added below.
    fn summary_row(&self, rows: &[Row], row_total_sum: f64) -> Row {
        let mut numeric_fields: IndexSet<String> = IndexSet::new();
        for r in rows {
            for (name, value) in r.iter() {
                if name == self.field_name && self.row {
                    continue;
                }
                if value.as_f64().is_some() {
                    numeric_fields.insert(name.to_string());
                }
            }
        }

        let mut summary = Row::new();
        let label_target = self.label_field.clone().or_else(|| {
            rows.first().and_then(|r| {
                r.iter()
                    .find(|(name, v)| v.as_f64().is_none() && *name != self.field_name)
                    .map(|(name, _)| name.to_string())
            })
        });
        let label_target = label_target.unwrap_or_else(|| "_total".to_string());
        summary.set(label_target, Value::str(self.label.clone()));

        for field in &numeric_fields {
            let total: f64 = rows.iter().filter_map(|r| r.get_value(field).as_f64()).sum();
            summary.set(field.clone(), Value::F64(total));
        }

        if self.row {
            summary.set(self.field_name.clone(), Value::F64(row_total_sum));
        }

        summary
    }
}

impl Operator for Addtotals {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.buffered = None;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        if !self.col {
            ctx.check()?;
            let Some(mut row) = self.child.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            if self.row {
                let total = self.row_sum(&row);
                row.set(self.field_name.clone(), Value::F64(total));
            }
            self.stats.rows_returned += 1;
            return Ok(Some(row));
        }

        if self.buffered.is_none() {
            let mut input = drain_all(self.child.as_mut(), ctx)?;
            self.stats.rows_read = input.len() as u64;
            let mut row_total_sum = 0.0;
            if self.row {
                for r in input.iter_mut() {
                    let total = self.row_sum(r);
                    row_total_sum += total;
                    r.set(self.field_name.clone(), Value::F64(total));
                }
            }
            let summary = self.summary_row(&input, row_total_sum);
            input.push(summary);
            self.buffered = Some(input.into_iter());
        }
        ctx.check()?;
        match self.buffered.as_mut().unwrap().next() {
            Some(row) => {
                self.stats.rows_returned += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.buffered = None;
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

    fn row(cat: &str, rev: i64, cnt: i64) -> Row {
        let mut r = Row::new();
        r.set("cat", Value::str(cat));
        r.set("rev", Value::I64(rev));
        r.set("cnt", Value::I64(cnt));
        r
    }

    #[test]
    fn col_totals_appends_one_trailing_row() {
        let child = Box::new(VecSource::new(vec![row("A", 100, 5), row("B", 200, 10)]));
        let mut op = Addtotals::new(child, false, true, vec![], None, Some("Total".to_string()), None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r);
        }
        assert_eq!(out.len(), 3);
        let summary = &out[2];
        assert_eq!(summary.get_value("cat"), Value::str("Total"));
        assert_eq!(summary.get_value("rev"), Value::F64(300.0));
        assert_eq!(summary.get_value("cnt"), Value::F64(15.0));
        op.close().unwrap();
    }

    #[test]
    fn row_totals_are_streaming_per_row() {
        let child = Box::new(VecSource::new(vec![row("A", 100, 5)]));
        let mut op = Addtotals::new(child, true, false, vec![], None, None, None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("total"), Value::F64(105.0));
        op.close().unwrap();
    }

    #[test]
    fn pass_through_when_both_false() {
        let child = Box::new(VecSource::new(vec![row("A", 100, 5)]));
        let mut op = Addtotals::new(child, false, false, vec![], None, None, None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(!out.contains("total"));
        assert_eq!(op.next(&ctx).unwrap(), None);
        op.close().unwrap();
    }
}

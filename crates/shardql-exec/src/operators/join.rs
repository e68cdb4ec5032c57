//! `Join` (§4.5): hash join. At `Open`, drains the right child bucketed by
//! `right_field`; then iterates the left child, looking up matches. Inner
//! skips unmatched left rows; left emits them once with right-side fields
//! absent. Conflicting field names are resolved by renaming the right
//! side's with an `_right` suffix; the right join field itself is never
//! duplicated into the result.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

pub struct Join {
    left: Child,
    right: Child,
    join_type: JoinType,
    left_field: String,
    right_field: String,
    buckets: FxHashMap<String, Vec<Row>>,
    pending: VecDeque<Row>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Join {
    pub fn new(
        left: Child,
        right: Child,
        join_type: JoinType,
        left_field: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self {
            left,
            right,
            join_type,
            left_field: left_field.into(),
            right_field: right_field.into(),
            buckets: FxHashMap::default(),
            pending: VecDeque::new(),
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn combine(&self, left_row: &Row, right_row: Option<&Row>) -> Row {
        let mut out = left_row.clone();
        if let Some(right_row) = right_row {
            for (name, value) in right_row.iter() {
                if name == self.right_field {
                    continue;
                }
                let target = if out.contains(name) {
                    format!("{name}_right")
                } else {
                    name.to_string()
                };
                out.set(target, value.clone());
            }
        }
        out
    }
}

impl Operator for Join {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.right.open(ctx)?;
        let right_rows = drain_all(self.right.as_mut(), ctx)?;
        self.right.close()?;
        self.buckets.clear();
        for row in right_rows {
            let key = row.get_value(&self.right_field).canonical_string();
            self.buckets.entry(key).or_default().push(row);
        }
        self.left.open(ctx)?;
        self.pending.clear();
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            if let Some(row) = self.pending.pop_front() {
                self.stats.rows_returned += 1;
                return Ok(Some(row));
            }
            ctx.check()?;
            let Some(left_row) = self.left.next(ctx)? else {
                return Ok(None);
            };
            self.stats.rows_read += 1;
            let key = left_row.get_value(&self.left_field).canonical_string();
            match self.buckets.get(&key) {
                Some(matches) if !matches.is_empty() => {
                    for right_row in matches {
                        self.pending.push_back(self.combine(&left_row, Some(right_row)));
                    }
                }
                _ => {
                    if self.join_type == JoinType::Left {
                        self.pending.push_back(self.combine(&left_row, None));
                    }
                }
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.pending.clear();
        self.left.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

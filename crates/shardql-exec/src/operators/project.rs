//! `Project` (§4.4): include-mode keeps listed fields (plus `_id`/`_score`
//! if present); exclude-mode removes listed fields. Preserves row insertion
//! order for surviving fields.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, FIELD_ID, FIELD_SCORE};
use shardql_core::CoreResult;

use crate::operators::Child;

pub enum ProjectMode {
    Include,
    Exclude,
}

pub struct Project {
    child: Child,
    mode: ProjectMode,
    fields: Vec<String>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Project {
    pub fn new(child: Child, mode: ProjectMode, fields: Vec<String>) -> Self {
        Self {
            child,
            mode,
            fields,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn project(&self, row: Row) -> Row {
        match self.mode {
            ProjectMode::Include => {
                let mut out = Row::with_capacity(self.fields.len() + 2);
                for name in &self.fields {
                    if let (Some(v), true) = row.get(name) {
                        out.set(name.clone(), v.clone());
                    }
                }
                for meta in [FIELD_ID, FIELD_SCORE] {
                    if let (Some(v), true) = row.get(meta) {
                        if !out.contains(meta) {
                            out.set(meta, v.clone());
                        }
                    }
                }
                out
            }
            ProjectMode::Exclude => {
                let mut out = row;
                for name in &self.fields {
                    out.delete(name);
                }
                out
            }
        }
    }
}

impl Operator for Project {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        ctx.check()?;
        match self.child.next(ctx)? {
            Some(row) => {
                self.stats.rows_read += 1;
                self.stats.rows_returned += 1;
                Ok(Some(self.project(row)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

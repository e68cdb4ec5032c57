//! `Appendcol(override)` (§4.5): materializes the subsearch at `Open`; for
//! each main row, merges by positional alignment with the i-th subsearch
//! row. `override` selects the subsearch value on a key conflict, else the
//! main value wins. Extra subsearch rows past the main input length are
//! discarded (§9: this depends on the main input being deterministically
//! ordered).

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

pub struct Appendcol {
    main: Child,
    sub: Child,
    override_main: bool,
    sub_rows: Vec<Row>,
    index: usize,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Appendcol {
    pub fn new(main: Child, sub: Child, override_main: bool) -> Self {
        Self {
            main,
            sub,
            override_main,
            sub_rows: Vec::new(),
            index: 0,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Appendcol {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.sub.open(ctx)?;
        self.sub_rows = drain_all(self.sub.as_mut(), ctx)?;
        self.sub.close()?;
        self.main.open(ctx)?;
        self.index = 0;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        ctx.check()?;
        let Some(mut row) = self.main.next(ctx)? else {
            return Ok(None);
        };
        self.stats.rows_read += 1;
        if let Some(sub_row) = self.sub_rows.get(self.index) {
            for (name, value) in sub_row.iter() {
                if self.override_main || !row.contains(name) {
                    row.set(name.to_string(), value.clone());
                }
            }
        }
        self.index += 1;
        self.stats.rows_returned += 1;
        Ok(Some(row))
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.main.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

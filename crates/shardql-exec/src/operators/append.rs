//! `Append` (§4.5): emits all rows from the main child, then opens the
//! subsearch and emits its rows.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::Child;

enum Phase {
    Main,
    Sub,
    Done,
}

pub struct Append {
    main: Child,
    sub: Child,
    phase: Phase,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Append {
    pub fn new(main: Child, sub: Child) -> Self {
        Self {
            main,
            sub,
            phase: Phase::Main,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Append {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.main.open(ctx)?;
        self.phase = Phase::Main;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            ctx.check()?;
            match self.phase {
                Phase::Main => match self.main.next(ctx)? {
                    Some(row) => {
                        self.stats.rows_read += 1;
                        self.stats.rows_returned += 1;
                        return Ok(Some(row));
                    }
                    None => {
                        self.sub.open(ctx)?;
                        self.phase = Phase::Sub;
                    }
                },
                Phase::Sub => match self.sub.next(ctx)? {
                    Some(row) => {
                        self.stats.rows_read += 1;
                        self.stats.rows_returned += 1;
                        return Ok(Some(row));
                    }
                    None => {
                        self.phase = Phase::Done;
                        return Ok(None);
                    }
                },
                Phase::Done => return Ok(None),
            }
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        let main_err = self.main.close().err();
        let sub_err = self.sub.close().err();
        match main_err.or(sub_err) {
            Some(e) => Err(e),
            None => Ok(()),
        }
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
    fn emits_main_then_sub() {
        let main = Box::new(VecSource::new(vec![row(1), row(2)]));
        let sub = Box::new(VecSource::new(vec![row(3)]));
        let mut op = Append::new(main, sub);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r.get_value("n"));
        }
        assert_eq!(out, vec![Value::I64(1), Value::I64(2), Value::I64(3)]);
        op.close().unwrap();
    }
}

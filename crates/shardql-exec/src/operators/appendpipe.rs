//! `Appendpipe` (§4.5): buffers all main rows, re-emits them, then opens
//! the subsearch (which typically consumes the same buffered rows through
//! a cloned feed set up by the driver) and emits its rows too.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

enum Phase {
    Main,
    Sub,
    Done,
}

pub struct Appendpipe {
    main: Child,
    sub: Child,
    main_rows: Option<std::vec::IntoIter<Row>>,
    phase: Phase,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Appendpipe {
    pub fn new(main: Child, sub: Child) -> Self {
        Self {
            main,
            sub,
            main_rows: None,
            phase: Phase::Main,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Appendpipe {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.main.open(ctx)?;
        let rows = drain_all(self.main.as_mut(), ctx)?;
        self.stats.rows_read = rows.len() as u64;
        self.main_rows = Some(rows.into_iter());
        self.phase = Phase::Main;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        loop {
            ctx.check()?;
            match self.phase {
                Phase::Main => match self.main_rows.as_mut().unwrap().next() {
                    Some(row) => {
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
        self.main_rows = None;
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
    fn reemits_main_then_sub() {
        let main = Box::new(VecSource::new(vec![row(1), row(2)]));
        let sub = Box::new(VecSource::new(vec![row(99)]));
        let mut op = Appendpipe::new(main, sub);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next(&ctx).unwrap() {
            out.push(r.get_value("n"));
        }
        assert_eq!(out, vec![Value::I64(1), Value::I64(2), Value::I64(99)]);
        op.close().unwrap();
    }
}

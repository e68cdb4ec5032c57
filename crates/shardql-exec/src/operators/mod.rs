//! Streaming (§4.4), materializing (§4.5), and statistics (§4.6) pipeline
//! operators, plus the subquery executor (§4.7) and scan adapter (§4.10).
//!
//! Every operator here implements [`shardql_core::operator::Operator`] and
//! owns its child (or children) as a boxed trait object; the executor driver
//! (`crate::driver`) is the only place that wires a tree together.

pub mod addcoltotals;
pub mod addtotals;
pub mod agg;
pub mod append;
pub mod appendcol;
pub mod appendpipe;
pub mod bin;
pub mod dedup;
pub mod eval;
pub mod eventstats;
pub mod fillnull;
pub mod filter;
pub mod flatten;
pub mod grok;
pub mod join;
pub mod limit;
pub mod lookup;
pub mod parse;
pub mod project;
pub mod rename;
pub mod replace;
pub mod reverse;
pub mod scan;
pub mod sort;
pub mod spath;
pub mod stats;
pub mod streamstats;
pub mod subquery;
pub mod table;
pub mod top_rare;

use shardql_core::operator::{Context, Operator};
use shardql_core::value::Row;
use shardql_core::CoreResult;

pub type Child = Box<dyn Operator>;

/// Drains `child` into a `Vec<Row>`, checking `ctx` between reads (§5:
/// "materializing operators additionally check between buffering
/// iterations"). Used by every operator in §4.5/§4.6/§4.7 that must see all
/// input before producing output.
pub fn drain_all(child: &mut dyn Operator, ctx: &Context) -> CoreResult<Vec<Row>> {
    let mut rows = Vec::new();
    loop {
        ctx.check()?;
        match child.next(ctx)? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}

/// Drains `child` up to `cap` rows, logging a warning if the cap is hit
/// (§4.7 subquery materialization cap).
pub fn drain_capped(child: &mut dyn Operator, ctx: &Context, cap: usize) -> CoreResult<Vec<Row>> {
    let mut rows = Vec::with_capacity(cap.min(1024));
    loop {
        if rows.len() >= cap {
            log::warn!("subquery materialization hit its cap of {cap} rows");
            break;
        }
        ctx.check()?;
        match child.next(ctx)? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}

/// A fixed `Vec<Row>` source operator used only by operator unit tests, in
/// place of a real Scan.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub struct VecSource {
        rows: std::vec::IntoIter<Row>,
        original: Vec<Row>,
        lifecycle: shardql_core::operator::Lifecycle,
    }

    impl VecSource {
        pub fn new(rows: Vec<Row>) -> Self {
            Self {
                original: rows.clone(),
                rows: rows.into_iter(),
                lifecycle: shardql_core::operator::Lifecycle::Initial,
            }
        }
    }

    impl Operator for VecSource {
        fn open(&mut self, _ctx: &Context) -> CoreResult<()> {
            self.rows = self.original.clone().into_iter();
            self.lifecycle = shardql_core::operator::Lifecycle::Opened;
            Ok(())
        }

        fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
            ctx.check()?;
            Ok(self.rows.next())
        }

        fn close(&mut self) -> CoreResult<()> {
            self.lifecycle = shardql_core::operator::Lifecycle::Closed;
            Ok(())
        }

        fn stats(&self) -> shardql_core::operator::Stats {
            shardql_core::operator::Stats::default()
        }
    }
}

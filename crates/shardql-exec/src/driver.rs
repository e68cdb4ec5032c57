//! Executor driver (§4.10): turns a physical plan into a tree of operators
//! and drives it to completion.
//!
//! A physical plan is produced by the (external, §1) logical-to-physical
//! planner; this module only recognizes the node shapes and dispatches to
//! the §4.4-§4.7 operator constructors. A single [`build`] visitor walks the
//! tree once, recursion-first, the way a dispatch over a plan sum type
//! should read: no reflection, no separate pass to resolve children.

use std::sync::Arc;
use std::time::Instant;

use shardql_core::error::CoreError;
use shardql_core::operator::{Context, Operator};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;
use shardql_index::shard::Shard;

use crate::expr::Expr;
use crate::operators::addcoltotals::Addcoltotals;
use crate::operators::addtotals::Addtotals;
use crate::operators::agg::AggSpec;
use crate::operators::append::Append;
use crate::operators::appendcol::Appendcol;
use crate::operators::appendpipe::Appendpipe;
use crate::operators::bin::{Bin, BinMode};
use crate::operators::dedup::Dedup;
use crate::operators::eval::Eval;
use crate::operators::eventstats::Eventstats;
use crate::operators::fillnull::Fillnull;
use crate::operators::filter::Filter;
use crate::operators::flatten::Flatten;
use crate::operators::grok::Grok;
use crate::operators::join::{Join, JoinType};
use crate::operators::limit::Limit;
use crate::operators::lookup::{Lookup, LookupOutput, LookupRegistry};
use crate::operators::parse::Parse;
use crate::operators::project::{Project, ProjectMode};
use crate::operators::rename::Rename;
use crate::operators::replace::{Replace, ReplaceMapping};
use crate::operators::reverse::Reverse;
use crate::operators::scan::Scan;
use crate::operators::sort::{Sort, SortKey};
use crate::operators::spath::Spath;
use crate::operators::stats::Aggregation;
use crate::operators::streamstats::Streamstats;
use crate::operators::subquery::{ExistsFilter, InFilter, ScalarFilter, ScalarOp};
use crate::operators::table::Table;
use crate::operators::top_rare::{TopRare, TopRareMode};

/// Resolves a `(index, shard)` pair to a live [`Shard`] (§6). Cluster
/// membership and master-node role assignment are external collaborators
/// (§1); all a scan node needs is the shard it reads from.
pub trait ShardResolver: Send + Sync {
    fn resolve(&self, index: &str, shard_id: u32) -> CoreResult<Arc<Shard>>;
}

/// The simplest `ShardResolver`: delegates straight to a [`ShardManager`].
///
/// [`ShardManager`]: shardql_index::manager::ShardManager
pub struct ManagerShardResolver {
    manager: Arc<shardql_index::manager::ShardManager>,
}

impl ManagerShardResolver {
    pub fn new(manager: Arc<shardql_index::manager::ShardManager>) -> Self {
        Self { manager }
    }
}

impl ShardResolver for ManagerShardResolver {
    fn resolve(&self, index: &str, shard_id: u32) -> CoreResult<Arc<Shard>> {
        self.manager
            .get(index, shard_id)
            .ok_or_else(|| CoreError::not_found(format!("shard {index}:{shard_id}")))
    }
}

/// A physical plan node (§4.10). The tree's leaves are always [`Plan::Scan`];
/// every interior node names the operator it lowers to plus its children.
/// Built by the external planner — this type only describes the shape the
/// driver is willing to dispatch on.
pub enum Plan {
    Scan {
        index: String,
        shard_id: u32,
        query: serde_json::Value,
        from: usize,
        size: Option<usize>,
    },
    Filter {
        child: Box<Plan>,
        condition: Expr,
    },
    Project {
        child: Box<Plan>,
        mode: ProjectMode,
        fields: Vec<String>,
    },
    Table {
        child: Box<Plan>,
        fields: Vec<String>,
    },
    Rename {
        child: Box<Plan>,
        pairs: Vec<(String, String)>,
    },
    Eval {
        child: Box<Plan>,
        assignments: Vec<(String, Expr)>,
    },
    Fillnull {
        child: Box<Plan>,
        fields: Option<Vec<String>>,
        value: Value,
    },
    Replace {
        child: Box<Plan>,
        field: String,
        mappings: Vec<ReplaceMapping>,
    },
    Parse {
        child: Box<Plan>,
        pattern: String,
        source_field: Option<String>,
    },
    Grok {
        child: Box<Plan>,
        pattern: String,
        source_field: Option<String>,
        keep_original: bool,
    },
    Spath {
        child: Box<Plan>,
        source_field: Option<String>,
        path: Option<String>,
        output_field: Option<String>,
    },
    Flatten {
        child: Box<Plan>,
        field: String,
    },
    Lookup {
        child: Box<Plan>,
        registry: Arc<dyn LookupRegistry>,
        table_name: String,
        join_field: String,
        outputs: Vec<LookupOutput>,
    },
    Limit {
        child: Box<Plan>,
        count: u64,
    },
    Sort {
        child: Box<Plan>,
        keys: Vec<SortKey>,
    },
    Reverse {
        child: Box<Plan>,
    },
    Dedup {
        child: Box<Plan>,
        fields: Vec<String>,
        count: u64,
        consecutive: bool,
    },
    TopRare {
        child: Box<Plan>,
        fields: Vec<String>,
        mode: TopRareMode,
        limit: usize,
        show_percent: bool,
    },
    Bin {
        child: Box<Plan>,
        field: String,
        mode: BinMode,
    },
    Join {
        left: Box<Plan>,
        right: Box<Plan>,
        join_type: JoinType,
        left_field: String,
        right_field: String,
    },
    Append {
        main: Box<Plan>,
        sub: Box<Plan>,
    },
    Appendcol {
        main: Box<Plan>,
        sub: Box<Plan>,
        override_main: bool,
    },
    Appendpipe {
        main: Box<Plan>,
        sub: Box<Plan>,
    },
    Stats {
        child: Box<Plan>,
        group_by: Vec<String>,
        aggs: Vec<AggSpec>,
    },
    Eventstats {
        child: Box<Plan>,
        group_by: Vec<String>,
        aggs: Vec<AggSpec>,
    },
    Streamstats {
        child: Box<Plan>,
        window: usize,
        group_by: Vec<String>,
        aggs: Vec<AggSpec>,
        reset_before: Option<Expr>,
        reset_after: Option<Expr>,
    },
    Addcoltotals {
        child: Box<Plan>,
        fields: Vec<String>,
        label_field: Option<String>,
    },
    Addtotals {
        child: Box<Plan>,
        row: bool,
        col: bool,
        fields: Vec<String>,
        label_field: Option<String>,
        label: Option<String>,
        field_name: Option<String>,
    },
    InFilter {
        main: Box<Plan>,
        sub: Box<Plan>,
        field: String,
        negate: bool,
    },
    ExistsFilter {
        main: Box<Plan>,
        sub: Box<Plan>,
        negate: bool,
    },
    ScalarFilter {
        main: Box<Plan>,
        sub: Box<Plan>,
        field: String,
        op: ScalarOp,
    },
}

/// Recursively lowers one plan node (and its children) to an operator tree
/// (§4.10). The only I/O performed here is resolving a scan leaf's shard;
/// everything else is pure construction — no `Open` happens until the
/// caller drives the returned tree.
pub fn build(plan: Plan, shards: &dyn ShardResolver) -> CoreResult<Box<dyn Operator>> {
    Ok(match plan {
        Plan::Scan {
            index,
            shard_id,
            query,
            from,
            size,
        } => {
            let shard = shards.resolve(&index, shard_id)?;
            let query_bytes = serde_json::to_vec(&query)
                .map_err(|e| CoreError::invalid(format!("scan: unserializable query: {e}")))?;
            Box::new(Scan::with_offset(shard, query_bytes, size, from))
        }
        Plan::Filter { child, condition } => {
            Box::new(Filter::new(build(*child, shards)?, condition))
        }
        Plan::Project {
            child,
            mode,
            fields,
        } => Box::new(Project::new(build(*child, shards)?, mode, fields)),
        Plan::Table { child, fields } => Box::new(Table::new(build(*child, shards)?, fields)),
        Plan::Rename { child, pairs } => Box::new(Rename::new(build(*child, shards)?, pairs)),
        Plan::Eval { child, assignments } => {
            Box::new(Eval::new(build(*child, shards)?, assignments))
        }
        Plan::Fillnull {
            child,
            fields,
            value,
        } => Box::new(Fillnull::new(build(*child, shards)?, fields, value)),
        Plan::Replace {
            child,
            field,
            mappings,
        } => Box::new(Replace::new(build(*child, shards)?, field, mappings)),
        Plan::Parse {
            child,
            pattern,
            source_field,
        } => Box::new(Parse::new(build(*child, shards)?, pattern, source_field)),
        Plan::Grok {
            child,
            pattern,
            source_field,
            keep_original,
        } => Box::new(Grok::new(
            build(*child, shards)?,
            pattern,
            source_field,
            keep_original,
        )),
        Plan::Spath {
            child,
            source_field,
            path,
            output_field,
        } => Box::new(Spath::new(
            build(*child, shards)?,
            source_field,
            path,
            output_field,
        )),
        Plan::Flatten { child, field } => Box::new(Flatten::new(build(*child, shards)?, field)),
        Plan::Lookup {
            child,
            registry,
            table_name,
            join_field,
            outputs,
        } => Box::new(Lookup::new(
            build(*child, shards)?,
            registry,
            table_name,
            join_field,
            outputs,
        )),
        Plan::Limit { child, count } => Box::new(Limit::new(build(*child, shards)?, count)),
        Plan::Sort { child, keys } => Box::new(Sort::new(build(*child, shards)?, keys)),
        Plan::Reverse { child } => Box::new(Reverse::new(build(*child, shards)?)),
        Plan::Dedup {
            child,
            fields,
            count,
            consecutive,
        } => Box::new(Dedup::new(build(*child, shards)?, fields, count, consecutive)),
        Plan::TopRare {
            child,
            fields,
            mode,
            limit,
            show_percent,
        } => Box::new(TopRare::new(
            build(*child, shards)?,
            fields,
            mode,
            limit,
            show_percent,
        )),
        Plan::Bin { child, field, mode } => Box::new(Bin::new(build(*child, shards)?, field, mode)),
        Plan::Join {
            left,
            right,
            join_type,
            left_field,
            right_field,
        } => Box::new(Join::new(
            build(*left, shards)?,
            build(*right, shards)?,
            join_type,
            left_field,
            right_field,
        )),
        Plan::Append { main, sub } => {
            Box::new(Append::new(build(*main, shards)?, build(*sub, shards)?))
        }
        Plan::Appendcol {
            main,
            sub,
            override_main,
        } => Box::new(Appendcol::new(
            build(*main, shards)?,
            build(*sub, shards)?,
            override_main,
        )),
        Plan::Appendpipe { main, sub } => {
            Box::new(Appendpipe::new(build(*main, shards)?, build(*sub, shards)?))
        }
        Plan::Stats {
            child,
            group_by,
            aggs,
        } => Box::new(Aggregation::new(build(*child, shards)?, group_by, aggs)),
        Plan::Eventstats {
            child,
            group_by,
            aggs,
        } => Box::new(Eventstats::new(build(*child, shards)?, group_by, aggs)),
        Plan::Streamstats {
            child,
            window,
            group_by,
            aggs,
            reset_before,
            reset_after,
        } => Box::new(Streamstats::new(
            build(*child, shards)?,
            window,
            group_by,
            aggs,
            reset_before,
            reset_after,
        )),
        Plan::Addcoltotals {
            child,
            fields,
            label_field,
        } => Box::new(Addcoltotals::new(build(*child, shards)?, fields, label_field)),
        Plan::Addtotals {
            child,
            row,
            col,
            fields,
            label_field,
            label,
            field_name,
        } => Box::new(Addtotals::new(
            build(*child, shards)?,
            row,
            col,
            fields,
            label_field,
            label,
            field_name,
        )),
        Plan::InFilter {
            main,
            sub,
            field,
            negate,
        } => Box::new(InFilter::new(
            build(*main, shards)?,
            build(*sub, shards)?,
            field,
            negate,
        )),
        Plan::ExistsFilter { main, sub, negate } => Box::new(ExistsFilter::new(
            build(*main, shards)?,
            build(*sub, shards)?,
            negate,
        )),
        Plan::ScalarFilter {
            main,
            sub,
            field,
            op,
        } => Box::new(ScalarFilter::new(
            build(*main, shards)?,
            build(*sub, shards)?,
            field,
            op,
        )),
    })
}

/// Result of driving one plan to completion (§4.10: "result packaging").
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub took_millis: u64,
}

/// Builds the operator tree for `plan`, opens it, drains it to completion
/// under `ctx`, and closes it — the first error from either draining or
/// closing wins, but `close` always runs (§7: close is best-effort but the
/// first error is still returned).
pub fn execute(plan: Plan, ctx: &Context, shards: &dyn ShardResolver) -> CoreResult<QueryResult> {
    let started = Instant::now();
    let mut op = build(plan, shards)?;
    op.open(ctx)?;
    let mut rows = Vec::new();
    let drain_err = loop {
        match op.next(ctx) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };
    let close_err = op.close().err();
    if let Some(e) = drain_err {
        return Err(e);
    }
    if let Some(e) = close_err {
        return Err(e);
    }
    Ok(QueryResult {
        rows,
        took_millis: started.elapsed().as_millis() as u64,
    })
}

//! Shared aggregation accumulator used by `stats`, `eventstats`, and
//! `streamstats` (§4.6). `distinct_count` is implemented as a real distinct
//! set rather than the source's plain row count (§9 open question, resolved
//! in DESIGN.md): callers that only need the cheaper approximation can
//! still read `Accumulator::count`.

use std::collections::HashSet;

use shardql_core::error::CoreError;
use shardql_core::value::Value;
use shardql_core::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    DistinctCount,
}

impl AggFunc {
    pub fn parse(name: &str) -> CoreResult<Self> {
        match name {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "distinct_count" => Ok(Self::DistinctCount),
            other => Err(CoreError::invalid(format!("unknown aggregation: {other}"))),
        }
    }

    pub fn default_alias(&self, field: Option<&str>) -> String {
        let name = match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::DistinctCount => "distinct_count",
        };
        match field {
            Some(f) => format!("{name}_{f}"),
            None => name.to_string(),
        }
    }
}

/// One `stats`/`eventstats`/`streamstats` aggregation: a function applied
/// to an optional source field (absent only for bare `count`), under an
/// output alias.
#[derive(Clone)]
pub struct AggSpec {
    pub func: AggFunc,
    pub field: Option<String>,
    pub alias: String,
}

impl AggSpec {
    pub fn new(func: AggFunc, field: Option<String>, alias: Option<String>) -> Self {
        let alias = alias.unwrap_or_else(|| func.default_alias(field.as_deref()));
        Self { func, field, alias }
    }
}

/// Running state for one aggregation within one group.
#[derive(Default, Clone)]
pub struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
    distinct: HashSet<String>,
}

impl Accumulator {
    /// Folds in one row's value for `count` (row always counts) or the
    /// field value otherwise (absent field contributes nothing but the row
    /// count, matching "count" semantics).
    pub fn add_row(&mut self, func: AggFunc, value: Option<&Value>) {
        if func == AggFunc::Count {
            self.count += 1;
            return;
        }
        let Some(value) = value else { return };
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Some(f) = value.as_f64() {
            self.sum += f;
        }
        self.min = Some(match self.min.take() {
            Some(cur) if cur.compare(value) <= std::cmp::Ordering::Equal => cur,
            _ => value.clone(),
        });
        self.max = Some(match self.max.take() {
            Some(cur) if cur.compare(value) >= std::cmp::Ordering::Equal => cur,
            _ => value.clone(),
        });
        self.distinct.insert(value.canonical_string());
    }

    pub fn finalize(&self, func: AggFunc) -> Value {
        match func {
            AggFunc::Count => Value::I64(self.count as i64),
            AggFunc::Sum => Value::F64(self.sum),
            AggFunc::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::F64(self.sum / self.count as f64)
                }
            }
            AggFunc::Min => self.min.clone().unwrap_or(Value::Null),
            AggFunc::Max => self.max.clone().unwrap_or(Value::Null),
            AggFunc::DistinctCount => Value::I64(self.distinct.len() as i64),
        }
    }
}

/// Computes the canonical-string group key for a row given the group-by
/// field list (empty = single global group).
pub fn group_key(row: &shardql_core::value::Row, group_by: &[String]) -> Vec<String> {
    group_by.iter().map(|f| row.get_value(f).canonical_string()).collect()
}

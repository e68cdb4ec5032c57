//! `Lookup` (§4.4): joins each row against a named external table by a
//! single join field. Loading/parsing lookup tables themselves is an
//! external collaborator (§1); this operator only owns resolving the table
//! at `Open` and applying it per row.

use std::collections::HashMap;
use std::sync::Arc;

use shardql_core::error::CoreError;
use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::Row;
use shardql_core::CoreResult;

use crate::operators::Child;

/// One loaded lookup table: a flat map from canonical-string join key to the
/// row of output fields it contributes.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<String, Row>,
}

impl LookupTable {
    pub fn new(entries: HashMap<String, Row>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Row> {
        self.entries.get(key)
    }
}

/// Resolves a lookup table by name. The configuration/loading side (CSV,
/// database, remote service, ...) lives behind this trait, external to the
/// executor core.
pub trait LookupRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<LookupTable>>;
}

/// One `(source_field, output_alias)` projection from a matched lookup row;
/// `output_alias` defaults to `source_field` when unset.
pub struct LookupOutput {
    pub source_field: String,
    pub alias: Option<String>,
}

pub struct Lookup {
    child: Child,
    registry: Arc<dyn LookupRegistry>,
    table_name: String,
    join_field: String,
    outputs: Vec<LookupOutput>,
    table: Option<Arc<LookupTable>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Lookup {
    pub fn new(
        child: Child,
        registry: Arc<dyn LookupRegistry>,
        table_name: impl Into<String>,
        join_field: impl Into<String>,
        outputs: Vec<LookupOutput>,
    ) -> Self {
        Self {
            child,
            registry,
            table_name: table_name.into(),
            join_field: join_field.into(),
            outputs,
            table: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Lookup {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.table = Some(self.registry.resolve(&self.table_name).ok_or_else(|| {
            CoreError::not_found(format!("lookup table {}", self.table_name))
        })?);
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
        let table = self.table.as_ref().expect("opened");
        if let (Some(join_value), true) = row.get(&self.join_field) {
            let key = join_value.canonical_string();
            if let Some(matched) = table.get(&key) {
                let matched = matched.clone();
                for out in &self.outputs {
                    if let (Some(v), true) = matched.get(&out.source_field) {
                        let name = out.alias.clone().unwrap_or_else(|| out.source_field.clone());
                        row.set(name, v.clone());
                    }
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
    use shardql_core::value::Value;

    struct StaticRegistry(HashMap<String, Arc<LookupTable>>);
    impl LookupRegistry for StaticRegistry {
        fn resolve(&self, name: &str) -> Option<Arc<LookupTable>> {
            self.0.get(name).cloned()
        }
    }

    fn registry() -> Arc<dyn LookupRegistry> {
        let mut users = HashMap::new();
        let mut alice = Row::new();
        alice.set("name", Value::str("Alice"));
        users.insert("u1".to_string(), alice);
        let mut tables = HashMap::new();
        tables.insert("users".to_string(), Arc::new(LookupTable::new(users)));
        Arc::new(StaticRegistry(tables))
    }

    #[test]
    fn hit_copies_output_field_under_alias() {
        let mut r = Row::new();
        r.set("user_id", Value::str("u1"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Lookup::new(
            child,
            registry(),
            "users",
            "user_id",
            vec![LookupOutput {
                source_field: "name".to_string(),
                alias: Some("user_name".to_string()),
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("user_name"), Value::str("Alice"));
        op.close().unwrap();
    }

    #[test]
    fn miss_passes_row_through_unchanged() {
        let mut r = Row::new();
        r.set("user_id", Value::str("missing"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Lookup::new(
            child,
            registry(),
            "users",
            "user_id",
            vec![LookupOutput {
                source_field: "name".to_string(),
                alias: None,
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(!out.contains("name"));
        op.close().unwrap();
    }

    #[test]
    fn missing_table_fails_at_open() {
        let child = Box::new(VecSource::new(vec![]));
        let mut op = Lookup::new(child, registry(), "nope", "user_id", vec![]);
        let ctx = Context::new();
        assert!(op.open(&ctx).is_err());
    }
}

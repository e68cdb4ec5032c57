//! `Spath` (§4.4): treats the source field as JSON. With a path, extracts
//! one value into a single output field (name derived from the last path
//! segment if unspecified). Without a path, auto-extracts every top-level
//! object field. Extracted scalars are canonical strings; arrays/objects
//! are preserved as nested [`Value`]s.

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value, FIELD_RAW};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Spath {
    child: Child,
    source_field: String,
    path: Option<String>,
    output_field: Option<String>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Spath {
    pub fn new(
        child: Child,
        source_field: Option<String>,
        path: Option<String>,
        output_field: Option<String>,
    ) -> Self {
        Self {
            child,
            source_field: source_field.unwrap_or_else(|| FIELD_RAW.to_string()),
            path,
            output_field,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }

    fn last_segment(path: &str) -> &str {
        path.rsplit('.').next().unwrap_or(path)
    }
}

fn scalar_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::from(v.clone()),
        other => Value::Str(
            other
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| other.to_string().trim_matches('"').to_string()),
        ),
    }
}

fn navigate<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut cur = root;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur)
}

impl Operator for Spath {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
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
        if let (Some(v), true) = row.get(&self.source_field) {
            let text = v.canonical_string();
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                match &self.path {
                    Some(path) => {
                        if let Some(found) = navigate(&parsed, path) {
                            let out_name = self
                                .output_field
                                .clone()
                                .unwrap_or_else(|| Self::last_segment(path).to_string());
                            row.set(out_name, scalar_to_value(found));
                        }
                    }
                    None => {
                        if let Some(obj) = parsed.as_object() {
                            for (k, v) in obj {
                                row.set(k.clone(), scalar_to_value(v));
                            }
                        }
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

    #[test]
    fn extracts_one_path_into_derived_field_name() {
        let mut r = Row::new();
        r.set(FIELD_RAW, Value::str(r#"{"user":{"name":"alice"}}"#));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Spath::new(child, None, Some("user.name".to_string()), None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("name"), Value::str("alice"));
        op.close().unwrap();
    }

    #[test]
    fn auto_extracts_top_level_fields_without_path() {
        let mut r = Row::new();
        r.set(FIELD_RAW, Value::str(r#"{"a":1,"b":"x"}"#));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Spath::new(child, None, None, None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("a"), Value::str("1"));
        assert_eq!(out.get_value("b"), Value::str("x"));
        op.close().unwrap();
    }

    #[test]
    fn nested_array_preserved_as_sequence() {
        let mut r = Row::new();
        r.set(FIELD_RAW, Value::str(r#"{"tags":["a","b"]}"#));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Spath::new(child, None, Some("tags".to_string()), None);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(matches!(out.get_value("tags"), Value::Seq(_)));
        op.close().unwrap();
    }
}

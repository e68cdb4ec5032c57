//! `Replace` (§4.4): string replacement on one field. A `/regex/`-shaped
//! pattern is a compiled regular-expression replacement; anything else is a
//! literal substring replacement. Mappings apply left-to-right; non-string
//! source values are first converted to canonical string.

use regex::Regex;
use shardql_core::error::CoreError;
use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::Child;

enum Pattern {
    Regex(Regex),
    Literal(String),
}

pub struct ReplaceMapping {
    pub pattern: String,
    pub replacement: String,
}

pub struct Replace {
    child: Child,
    field: String,
    mappings: Vec<ReplaceMapping>,
    compiled: Vec<(Pattern, String)>,
    lifecycle: Lifecycle,
    stats: Stats,
}

fn parse_pattern(raw: &str) -> CoreResult<Pattern> {
    if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        let inner = &raw[1..raw.len() - 1];
        let re = Regex::new(inner)
            .map_err(|e| CoreError::invalid(format!("replace: invalid regex {inner:?}: {e}")))?;
        Ok(Pattern::Regex(re))
    } else {
        Ok(Pattern::Literal(raw.to_string()))
    }
}

impl Replace {
    pub fn new(child: Child, field: impl Into<String>, mappings: Vec<ReplaceMapping>) -> Self {
        Self {
            child,
            field: field.into(),
            mappings,
            compiled: Vec::new(),
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Replace {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.compiled = self
            .mappings
            .iter()
            .map(|m| parse_pattern(&m.pattern).map(|p| (p, m.replacement.clone())))
            .collect::<CoreResult<_>>()?;
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
        if let (Some(v), true) = row.get(&self.field) {
            let mut s = v.canonical_string();
            for (pattern, replacement) in &self.compiled {
                s = match pattern {
                    Pattern::Regex(re) => re.replace_all(&s, replacement.as_str()).into_owned(),
                    Pattern::Literal(lit) => s.replace(lit.as_str(), replacement),
                };
            }
            row.set(self.field.clone(), Value::Str(s));
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
    fn literal_replacement() {
        let mut r = Row::new();
        r.set("msg", Value::str("hello world"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Replace::new(
            child,
            "msg",
            vec![ReplaceMapping {
                pattern: "world".to_string(),
                replacement: "rust".to_string(),
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("msg"), Value::str("hello rust"));
        op.close().unwrap();
    }

    #[test]
    fn regex_replacement() {
        let mut r = Row::new();
        r.set("msg", Value::str("a1b2c3"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Replace::new(
            child,
            "msg",
            vec![ReplaceMapping {
                pattern: "/[0-9]+/".to_string(),
                replacement: "#".to_string(),
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("msg"), Value::str("a#b#c#"));
        op.close().unwrap();
    }

    #[test]
    fn non_string_value_converted_first() {
        let mut r = Row::new();
        r.set("n", Value::I64(123));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Replace::new(
            child,
            "n",
            vec![ReplaceMapping {
                pattern: "2".to_string(),
                replacement: "X".to_string(),
            }],
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("n"), Value::str("1X3"));
        op.close().unwrap();
    }
}

//! `Grok` (§4.4): like [`crate::operators::parse::Parse`], but the pattern
//! language is a named-pattern macro expansion (`%{NAME:field[:type]}`)
//! layered over regular expressions. `type` coerces the captured string to
//! `int`/`float`; `keepOriginal` controls whether the source field survives
//! a successful extraction.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use shardql_core::error::CoreError;
use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value, FIELD_RAW};
use shardql_core::CoreResult;

use crate::operators::Child;

/// A small built-in library of named Grok macros, the ones commonly needed
/// by log parsing. Unknown `%{NAME}` references are an `Open`-time error.
static BUILTIN_PATTERNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("WORD", r"\b\w+\b"),
        ("NUMBER", r"[+-]?(?:\d+\.\d+|\d+)"),
        ("INT", r"[+-]?\d+"),
        ("IP", r"(?:[0-9]{1,3}\.){3}[0-9]{1,3}"),
        ("HOSTNAME", r"[a-zA-Z0-9][a-zA-Z0-9._-]*"),
        ("GREEDYDATA", r".*"),
        ("NOTSPACE", r"\S+"),
        ("SPACE", r"\s*"),
        ("TIMESTAMP_ISO8601", r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?"),
        ("LOGLEVEL", r"(?:DEBUG|INFO|WARN|WARNING|ERROR|FATAL|TRACE)"),
        ("UUID", r"[A-Fa-f0-9]{8}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{4}-[A-Fa-f0-9]{12}"),
    ])
});

static MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%\{([A-Za-z0-9_]+)(?::([A-Za-z0-9_]+))?(?::([A-Za-z]+))?\}").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureType {
    Str,
    Int,
    Float,
}

/// Expands `%{NAME:field[:type]}` macros into a single regex with named
/// capture groups, returning the compiled regex and the field->type map for
/// captures that requested a numeric coercion.
fn compile_grok(pattern: &str) -> CoreResult<(Regex, HashMap<String, CaptureType>)> {
    let mut expanded = String::with_capacity(pattern.len() * 2);
    let mut types = HashMap::new();
    let mut last_end = 0;
    for caps in MACRO_RE.captures_iter(pattern) {
        let whole = caps.get(0).unwrap();
        expanded.push_str(&regex::escape(&pattern[last_end..whole.start()]));
        last_end = whole.end();

        let macro_name = caps.get(1).unwrap().as_str();
        let body = BUILTIN_PATTERNS
            .get(macro_name)
            .ok_or_else(|| CoreError::invalid(format!("grok: unknown pattern %{{{macro_name}}}")))?;
        match caps.get(2) {
            Some(field) => {
                let field = field.as_str();
                expanded.push_str(&format!("(?P<{field}>{body})"));
                if let Some(ty) = caps.get(3) {
                    let ct = match ty.as_str() {
                        "int" => CaptureType::Int,
                        "float" => CaptureType::Float,
                        _ => CaptureType::Str,
                    };
                    types.insert(field.to_string(), ct);
                }
            }
            None => expanded.push_str(&format!("(?:{body})")),
        }
    }
    expanded.push_str(&regex::escape(&pattern[last_end..]));

    let regex = Regex::new(&expanded)
        .map_err(|e| CoreError::invalid(format!("grok: compiled pattern invalid: {e}")))?;
    Ok((regex, types))
}

pub struct Grok {
    child: Child,
    pattern: String,
    source_field: String,
    keep_original: bool,
    compiled: Option<(Regex, HashMap<String, CaptureType>)>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Grok {
    pub fn new(
        child: Child,
        pattern: impl Into<String>,
        source_field: Option<String>,
        keep_original: bool,
    ) -> Self {
        Self {
            child,
            pattern: pattern.into(),
            source_field: source_field.unwrap_or_else(|| FIELD_RAW.to_string()),
            keep_original,
            compiled: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

fn coerce(raw: &str, ty: CaptureType) -> Value {
    match ty {
        CaptureType::Str => Value::Str(raw.to_string()),
        CaptureType::Int => raw
            .parse::<i64>()
            .map(Value::I64)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        CaptureType::Float => raw
            .parse::<f64>()
            .map(Value::F64)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
    }
}

impl Operator for Grok {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.compiled = Some(compile_grok(&self.pattern)?);
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
        let (regex, types) = self.compiled.as_ref().expect("opened");
        if let (Some(v), true) = row.get(&self.source_field) {
            let text = v.canonical_string();
            if let Some(caps) = regex.captures(&text) {
                for name in regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        let ty = types.get(name).copied().unwrap_or(CaptureType::Str);
                        row.set(name.to_string(), coerce(m.as_str(), ty));
                    }
                }
                if !self.keep_original {
                    row.delete(&self.source_field);
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
    fn extracts_typed_captures() {
        let mut r = Row::new();
        r.set(FIELD_RAW, Value::str("1.2.3.4 status=200"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Grok::new(
            child,
            "%{IP:client} status=%{NUMBER:status:int}",
            None,
            false,
        );
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert_eq!(out.get_value("client"), Value::str("1.2.3.4"));
        assert_eq!(out.get_value("status"), Value::I64(200));
        assert!(!out.contains(FIELD_RAW));
        op.close().unwrap();
    }

    #[test]
    fn keep_original_retains_source_field() {
        let mut r = Row::new();
        r.set(FIELD_RAW, Value::str("1.2.3.4"));
        let child = Box::new(VecSource::new(vec![r]));
        let mut op = Grok::new(child, "%{IP:client}", None, true);
        let ctx = Context::new();
        op.open(&ctx).unwrap();
        let out = op.next(&ctx).unwrap().unwrap();
        assert!(out.contains(FIELD_RAW));
        op.close().unwrap();
    }

    #[test]
    fn unknown_pattern_fails_at_open() {
        let child = Box::new(VecSource::new(vec![]));
        let mut op = Grok::new(child, "%{NOPE:x}", None, false);
        let ctx = Context::new();
        assert!(op.open(&ctx).is_err());
    }
}

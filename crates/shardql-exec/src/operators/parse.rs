//! `Parse` / `Rex` (§4.4): compiles one regular expression at `Open` and
//! applies it to a source field (Rex defaults to `_raw`) on every row.
//! Named capture groups become fields on match; a non-match leaves the row
//! unchanged. Compilation failure is a fatal `Open` error.

use regex::Regex;
use shardql_core::error::CoreError;
use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value, FIELD_RAW};
use shardql_core::CoreResult;

use crate::operators::Child;

pub struct Parse {
    child: Child,
    pattern: String,
    source_field: String,
    regex: Option<Regex>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Parse {
    pub fn new(child: Child, pattern: impl Into<String>, source_field: Option<String>) -> Self {
        Self {
            child,
            pattern: pattern.into(),
            source_field: source_field.unwrap_or_else(|| FIELD_RAW.to_string()),
            regex: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

impl Operator for Parse {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.regex = Some(
            Regex::new(&self.pattern)
                .map_err(|e| CoreError::invalid(format!("parse: invalid regex: {e}")))?,
        );
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
        let regex = self.regex.as_ref().expect("opened");
        if let (Some(v), true) = row.get(&self.source_field) {
            let text = v.canonical_string();
            if let Some(caps) = regex.captures(&text) {
                for name in regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        row.set(name.to_string(), Value::Str(m.as_str().to_string()));
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

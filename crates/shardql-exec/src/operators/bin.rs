//! `Bin` (§4.5): either truncates a timestamp field to the start of its
//! time-span bucket (`value` + `unit` from `{s,m,h,d,w,mon,y}`), or
//! produces fixed-width numeric buckets over a count. The numeric mode
//! two-passes the input to find a data-driven `[min, max]` range, falling
//! back to the spec's default `0..100` only when there is no data at all
//! (§9 open question). The bucketed value writes back into the same field.

use chrono::{Datelike, TimeZone, Utc};

use shardql_core::operator::{require_opened, Context, Lifecycle, Operator, Stats};
use shardql_core::value::{Row, Value};
use shardql_core::CoreResult;

use crate::operators::{drain_all, Child};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

pub enum BinMode {
    TimeSpan { value: i64, unit: TimeUnit },
    Count { bins: u32 },
}

pub struct Bin {
    child: Child,
    field: String,
    mode: BinMode,
    rows: Option<std::vec::IntoIter<Row>>,
    lifecycle: Lifecycle,
    stats: Stats,
}

impl Bin {
    pub fn new(child: Child, field: impl Into<String>, mode: BinMode) -> Self {
        Self {
            child,
            field: field.into(),
            mode,
            rows: None,
            lifecycle: Lifecycle::Initial,
            stats: Stats::default(),
        }
    }
}

/// Truncates an epoch-seconds timestamp to the start of its `value*unit`
/// bucket. `mon`/`y` truncate calendar-wise rather than by fixed duration.
fn truncate_timestamp(epoch_secs: f64, value: i64, unit: TimeUnit) -> f64 {
    let value = value.max(1);
    match unit {
        TimeUnit::Second | TimeUnit::Minute | TimeUnit::Hour | TimeUnit::Day | TimeUnit::Week => {
            let unit_secs: i64 = match unit {
                TimeUnit::Second => 1,
                TimeUnit::Minute => 60,
                TimeUnit::Hour => 3600,
                TimeUnit::Day => 86_400,
                TimeUnit::Week => 604_800,
                _ => unreachable!(),
            };
            let span = unit_secs * value;
            let secs = epoch_secs.floor() as i64;
            ((secs.div_euclid(span)) * span) as f64
        }
        TimeUnit::Month => {
            let dt = Utc.timestamp_opt(epoch_secs.floor() as i64, 0).single().unwrap_or_default();
            let total_months = dt.year() as i64 * 12 + (dt.month() as i64 - 1);
            let bucket_months = total_months.div_euclid(value) * value;
            let year = bucket_months.div_euclid(12) as i32;
            let month = (bucket_months.rem_euclid(12)) as u32 + 1;
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp() as f64)
                .unwrap_or(epoch_secs)
        }
        TimeUnit::Year => {
            let dt = Utc.timestamp_opt(epoch_secs.floor() as i64, 0).single().unwrap_or_default();
            let bucket_year = (dt.year() as i64).div_euclid(value) * value;
            Utc.with_ymd_and_hms(bucket_year as i32, 1, 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp() as f64)
                .unwrap_or(epoch_secs)
        }
    }
}

impl Bin {
    fn apply_timespan(&self, mut rows: Vec<Row>, value: i64, unit: TimeUnit) -> Vec<Row> {
        for row in &mut rows {
            if let Some(ts) = row.get_value(&self.field).as_f64() {
                row.set(self.field.clone(), Value::F64(truncate_timestamp(ts, value, unit)));
            }
        }
        rows
    }

    fn apply_count(&self, mut rows: Vec<Row>, bins: u32) -> Vec<Row> {
        let bins = bins.max(1) as f64;
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for row in &rows {
            if let Some(n) = row.get_value(&self.field).as_f64() {
                lo = lo.min(n);
                hi = hi.max(n);
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            lo = 0.0;
            hi = 100.0;
        }
        if hi <= lo {
            hi = lo + 1.0;
        }
        let width = (hi - lo) / bins;
        for row in &mut rows {
            if let Some(n) = row.get_value(&self.field).as_f64() {
                let idx = ((n - lo) / width).floor().clamp(0.0, bins - 1.0);
                let bucket_lo = lo + idx * width;
                row.set(self.field.clone(), Value::F64(bucket_lo));
            }
        }
        rows
    }
}

impl Operator for Bin {
    fn open(&mut self, ctx: &Context) -> CoreResult<()> {
        self.child.open(ctx)?;
        self.rows = None;
        self.lifecycle = Lifecycle::Opened;
        Ok(())
    }

    fn next(&mut self, ctx: &Context) -> CoreResult<Option<Row>> {
        require_opened(self.lifecycle)?;
        if self.rows.is_none() {
            let input = drain_all(self.child.as_mut(), ctx)?;
            self.stats.rows_read = input.len() as u64;
            let out = match self.mode {
                BinMode::TimeSpan { value, unit } => self.apply_timespan(input, value, unit),
                BinMode::Count { bins } => self.apply_count(input, bins),
            };
            self.rows = Some(out.into_iter());
        }
        ctx.check()?;
        match self.rows.as_mut().unwrap().next() {
            Some(row) => {
                self.stats.rows_returned += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> CoreResult<()> {
        self.lifecycle = Lifecycle::Closed;
        self.rows = None;
        self.child.close()
    }

    fn stats(&self) -> Stats {
        self.stats
    }
}

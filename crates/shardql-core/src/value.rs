//! Dynamically-typed value and row model shared by the shard core and the
//! pipeline executor.
//!
//! A [`Value`] is the tagged sum every field of a [`Row`] holds. Numeric
//! coercion, comparison, and canonical string conversion are implemented once
//! here so the expression evaluator and every operator share one definition.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;

/// Reserved (but not privileged) metadata fields on a search hit row.
pub const FIELD_ID: &str = "_id";
pub const FIELD_SCORE: &str = "_score";
pub const FIELD_RAW: &str = "_raw";

/// A dynamically-typed value: null, boolean, integer of either signedness,
/// float, string, ordered sequence, or nested mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion rule (§3): any integer or float coerces to f64;
    /// strings and sequences never coerce silently. Booleans do not coerce
    /// here either — only in explicit evaluator paths (see `shardql-exec`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(i) => Some(*i as f64),
            Value::U64(u) => Some(*u as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            Value::U64(u) => i64::try_from(*u).ok(),
            Value::F64(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form used whenever two values can't both be coerced
    /// to numbers: strings pass through, everything else uses its display
    /// form. Used by dedup/top/rare keys, `=`/`!=` fallback, and `.` concat.
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::I64(i) => i.to_string(),
            Value::U64(u) => u.to_string(),
            Value::F64(f) => format_f64(*f),
            Value::Str(s) => s.clone(),
            Value::Seq(items) => {
                let parts: Vec<String> = items.iter().map(Value::canonical_string).collect();
                format!("[{}]", parts.join(","))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{k}:{}", v.canonical_string()))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    /// Comparison rule (§3): numeric if both coerce, else canonical-string
    /// comparison. Null sorts lowest and equals only null.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.canonical_string().cmp(&other.canonical_string()),
            },
        }
    }

    pub fn numeric_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self.canonical_string() == other.canonical_string(),
            },
        }
    }
}

fn format_f64(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Best-effort conversion from a `serde_json::Value`, used by the scan
/// adapter (hit `_source`) and by `spath`/Grok typed captures.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::U64(u)
                } else {
                    Value::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, Value::from(v));
                }
                Value::Map(out)
            }
        }
    }
}

/// An unordered-by-contract, ordered-by-implementation mapping from field
/// name to [`Value`] (§3). Cloning is shallow-value, fresh-map: a clone never
/// aliases the source row's backing storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row(IndexMap::new())
    }

    pub fn with_capacity(cap: usize) -> Self {
        Row(IndexMap::with_capacity(cap))
    }

    /// `(value, present)`: missing fields never error, they report absent.
    pub fn get(&self, name: &str) -> (Option<&Value>, bool) {
        match self.0.get(name) {
            Some(v) => (Some(v), true),
            None => (None, false),
        }
    }

    pub fn get_value(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Setting a field to `Value::Null` is distinct from deleting it: the
    /// key remains present with a null value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn delete(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.0.clone()
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.0
    }

    pub fn as_int64(&self, name: &str) -> (Option<i64>, bool) {
        match self.0.get(name) {
            Some(v) => (v.as_i64(), true),
            None => (None, false),
        }
    }

    pub fn as_float64(&self, name: &str) -> (Option<f64>, bool) {
        match self.0.get(name) {
            Some(v) => (v.as_f64(), true),
            None => (None, false),
        }
    }

    pub fn as_bool(&self, name: &str) -> (Option<bool>, bool) {
        match self.0.get(name) {
            Some(v) => (v.as_bool(), true),
            None => (None, false),
        }
    }

    pub fn as_string(&self, name: &str) -> (Option<String>, bool) {
        match self.0.get(name) {
            Some(v) => (Some(v.canonical_string()), true),
            None => (None, false),
        }
    }
}

impl From<IndexMap<String, Value>> for Row {
    fn from(m: IndexMap<String, Value>) -> Self {
        Row(m)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Row(IndexMap::from_iter(iter))
    }
}

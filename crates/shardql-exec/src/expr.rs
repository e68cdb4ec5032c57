//! Expression evaluator (§4.3): literals, field references, unary/binary
//! operators and a fixed built-in function set, evaluated against one [`Row`]
//! at a time.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use shardql_core::error::{CoreError, CoreResult};
use shardql_core::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
    In,
    Concat,
}

/// An expression tree (§4.3). Built by the (external) planner; the evaluator
/// only walks it.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    FieldRef(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    pub fn lit(v: impl Into<Value>) -> Self {
        Expr::Literal(v.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expr::FieldRef(name.into())
    }
}

/// Truthiness used by `and`/`or` (§4.3): boolean straight through, number
/// truthy iff non-zero, string truthy iff non-empty, null is falsy.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::I64(_) | Value::U64(_) | Value::F64(_) => v.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Str(s) => !s.is_empty(),
        Value::Seq(s) => !s.is_empty(),
        Value::Map(m) => !m.is_empty(),
    }
}

/// `=`/`!=` use the numeric rule if both coerce, else canonical-string
/// equality (§4.3).
fn eq_values(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.canonical_string() == b.canonical_string(),
    }
}

/// Translates SQL wildcards (`%` = any run, `_` = single character) into an
/// anchored regex, escaping every other character literally.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Compiled `like` patterns, keyed on the literal LIKE pattern string. A
/// `like` comparison recompiles its pattern on every row unless cached here;
/// most queries use the same handful of literal patterns across an entire
/// scan, so this is a straight win.
static LIKE_PATTERN_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn like_regex(pattern: &str) -> CoreResult<Regex> {
    let mut cache = LIKE_PATTERN_CACHE.lock().unwrap();
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(&like_to_regex(pattern))
        .map_err(|e| CoreError::exec(format!("invalid like pattern: {e}")))?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

pub fn eval(expr: &Expr, row: &Row) -> CoreResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::FieldRef(name) => Ok(row.get_value(name)),
        Expr::Unary(op, e) => eval_unary(*op, eval(e, row)?),
        Expr::Binary(op, l, r) => eval_binary(*op, eval(l, row)?, eval(r, row)?),
        Expr::Call(name, args) => {
            let values: Vec<Value> = args.iter().map(|a| eval(a, row)).collect::<CoreResult<_>>()?;
            eval_call(name, values)
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> CoreResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(&v))),
        UnaryOp::Neg => match v.as_f64() {
            Some(f) => Ok(Value::F64(-f)),
            None => Ok(Value::Null),
        },
    }
}

fn arith(op: BinaryOp, a: &Value, b: &Value) -> Value {
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Value::Null;
    };
    match op {
        BinaryOp::Add => Value::F64(x + y),
        BinaryOp::Sub => Value::F64(x - y),
        BinaryOp::Mul => Value::F64(x * y),
        BinaryOp::Div => {
            if y == 0.0 {
                Value::Null
            } else {
                Value::F64(x / y)
            }
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                Value::Null
            } else {
                Value::F64(x % y)
            }
        }
        _ => unreachable!(),
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> CoreResult<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            Ok(arith(op, &l, &r))
        }
        BinaryOp::Eq => Ok(Value::Bool(eq_values(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!eq_values(&l, &r))),
        BinaryOp::Lt => Ok(Value::Bool(l.compare(&r) == std::cmp::Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(l.compare(&r) != std::cmp::Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(l.compare(&r) == std::cmp::Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(l.compare(&r) != std::cmp::Ordering::Less)),
        BinaryOp::And => Ok(Value::Bool(truthy(&l) && truthy(&r))),
        BinaryOp::Or => Ok(Value::Bool(truthy(&l) || truthy(&r))),
        BinaryOp::Like => {
            let re = like_regex(&r.canonical_string())?;
            Ok(Value::Bool(re.is_match(&l.canonical_string())))
        }
        BinaryOp::In => match r.as_seq() {
            Some(items) => Ok(Value::Bool(items.iter().any(|item| eq_values(&l, item)))),
            None => Ok(Value::Bool(false)),
        },
        BinaryOp::Concat => Ok(Value::Str(format!(
            "{}{}",
            l.canonical_string(),
            r.canonical_string()
        ))),
    }
}

fn arg_f64(args: &[Value], i: usize, func: &str) -> CoreResult<f64> {
    args.get(i)
        .and_then(Value::as_f64)
        .ok_or_else(|| CoreError::exec(format!("{func}: argument {i} is not numeric")))
}

fn eval_call(name: &str, args: Vec<Value>) -> CoreResult<Value> {
    match name {
        "abs" => Ok(Value::F64(arg_f64(&args, 0, "abs")?.abs())),
        "upper" => Ok(Value::Str(
            args.first().map(Value::canonical_string).unwrap_or_default().to_uppercase(),
        )),
        "lower" => Ok(Value::Str(
            args.first().map(Value::canonical_string).unwrap_or_default().to_lowercase(),
        )),
        "length" | "len" => Ok(Value::I64(
            args.first().map(Value::canonical_string).unwrap_or_default().chars().count() as i64,
        )),
        "isnull" => Ok(Value::Bool(args.first().map(Value::is_null).unwrap_or(true))),
        "isnotnull" => Ok(Value::Bool(!args.first().map(Value::is_null).unwrap_or(true))),
        "trim" => Ok(Value::Str(
            args.first().map(Value::canonical_string).unwrap_or_default().trim().to_string(),
        )),
        "ltrim" => Ok(Value::Str(
            args.first()
                .map(Value::canonical_string)
                .unwrap_or_default()
                .trim_start()
                .to_string(),
        )),
        "rtrim" => Ok(Value::Str(
            args.first()
                .map(Value::canonical_string)
                .unwrap_or_default()
                .trim_end()
                .to_string(),
        )),
        "substr" => {
            let s = args
                .first()
                .map(Value::canonical_string)
                .ok_or_else(|| CoreError::exec("substr: missing string argument"))?;
            let chars: Vec<char> = s.chars().collect();
            let start = arg_f64(&args, 1, "substr")? as i64;
            let start_idx = if start > 0 { (start - 1) as usize } else { 0 };
            let start_idx = start_idx.min(chars.len());
            let end_idx = match args.get(2).and_then(Value::as_f64) {
                Some(len) => (start_idx + len.max(0.0) as usize).min(chars.len()),
                None => chars.len(),
            };
            Ok(Value::Str(chars[start_idx..end_idx].iter().collect()))
        }
        "concat" => Ok(Value::Str(
            args.iter().map(Value::canonical_string).collect::<Vec<_>>().concat(),
        )),
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "if" => {
            if args.len() != 3 {
                return Err(CoreError::exec("if: expects 3 arguments"));
            }
            Ok(if truthy(&args[0]) {
                args[1].clone()
            } else {
                args[2].clone()
            })
        }
        "round" => {
            let x = arg_f64(&args, 0, "round")?;
            let precision = args.get(1).and_then(Value::as_f64).unwrap_or(0.0) as i32;
            let factor = 10f64.powi(precision);
            Ok(Value::F64((x * factor).round() / factor))
        }
        "floor" => Ok(Value::F64(arg_f64(&args, 0, "floor")?.floor())),
        "ceil" => Ok(Value::F64(arg_f64(&args, 0, "ceil")?.ceil())),
        "sqrt" => Ok(Value::F64(arg_f64(&args, 0, "sqrt")?.sqrt())),
        "pow" => Ok(Value::F64(
            arg_f64(&args, 0, "pow")?.powf(arg_f64(&args, 1, "pow")?),
        )),
        other => Err(CoreError::exec(format!("unknown function: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(field: &str, v: impl Into<Value>) -> Row {
        let mut r = Row::new();
        r.set(field, v.into());
        r
    }

    #[test]
    fn field_ref_missing_is_null() {
        let r = Row::new();
        assert_eq!(eval(&Expr::field("x"), &r).unwrap(), Value::Null);
    }

    #[test]
    fn division_by_zero_is_null_not_error() {
        let r = Row::new();
        let e = Expr::Binary(BinaryOp::Div, Box::new(Expr::lit(1i64)), Box::new(Expr::lit(0i64)));
        assert_eq!(eval(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn modulo_by_zero_is_null() {
        let r = Row::new();
        let e = Expr::Binary(BinaryOp::Mod, Box::new(Expr::lit(5i64)), Box::new(Expr::lit(0i64)));
        assert_eq!(eval(&e, &r).unwrap(), Value::Null);
    }

    #[test]
    fn equality_falls_back_to_canonical_string() {
        let r = Row::new();
        let e = Expr::Binary(
            BinaryOp::Eq,
            Box::new(Expr::lit("abc")),
            Box::new(Expr::lit("abc")),
        );
        assert_eq!(eval(&e, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn and_or_short_circuit_truthy_rules() {
        let r = Row::new();
        let and_false = Expr::Binary(
            BinaryOp::And,
            Box::new(Expr::lit(0i64)),
            Box::new(Expr::lit("x")),
        );
        assert_eq!(eval(&and_false, &r).unwrap(), Value::Bool(false));

        let or_true = Expr::Binary(
            BinaryOp::Or,
            Box::new(Expr::lit("")),
            Box::new(Expr::lit("y")),
        );
        assert_eq!(eval(&or_true, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn like_wildcards() {
        let r = row_with("name", "hello world");
        let e = Expr::Binary(
            BinaryOp::Like,
            Box::new(Expr::field("name")),
            Box::new(Expr::lit("hello%")),
        );
        assert_eq!(eval(&e, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn like_pattern_is_compiled_once_and_reused() {
        // same literal pattern, evaluated against many rows: the cached
        // compiled regex must keep matching correctly on repeat lookups,
        // not just the first time the pattern is seen.
        let pattern = "shardql_like_cache_probe_%";
        let hit = row_with("name", "shardql_like_cache_probe_abc");
        let miss = row_with("name", "nope");
        let e = Expr::Binary(
            BinaryOp::Like,
            Box::new(Expr::field("name")),
            Box::new(Expr::lit(pattern)),
        );
        for _ in 0..3 {
            assert_eq!(eval(&e, &hit).unwrap(), Value::Bool(true));
            assert_eq!(eval(&e, &miss).unwrap(), Value::Bool(false));
        }
    }

    #[test]
    fn in_tests_membership_via_equality() {
        let r = Row::new();
        let seq = Value::Seq(vec![Value::I64(1), Value::I64(2), Value::I64(3)]);
        let e = Expr::Binary(BinaryOp::In, Box::new(Expr::lit(2i64)), Box::new(Expr::Literal(seq)));
        assert_eq!(eval(&e, &r).unwrap(), Value::Bool(true));
    }

    #[test]
    fn concat_uses_canonical_string() {
        let r = Row::new();
        let e = Expr::Binary(
            BinaryOp::Concat,
            Box::new(Expr::lit("x=")),
            Box::new(Expr::lit(5i64)),
        );
        assert_eq!(eval(&e, &r).unwrap(), Value::Str("x=5".to_string()));
    }

    #[test]
    fn builtin_functions() {
        let r = Row::new();
        assert_eq!(
            eval_call("abs", vec![Value::F64(-3.5)]).unwrap(),
            Value::F64(3.5)
        );
        assert_eq!(
            eval_call("upper", vec![Value::str("abc")]).unwrap(),
            Value::Str("ABC".into())
        );
        assert_eq!(
            eval_call("substr", vec![Value::str("hello"), Value::I64(2), Value::I64(3)]).unwrap(),
            Value::Str("ell".into())
        );
        assert_eq!(
            eval_call("coalesce", vec![Value::Null, Value::Null, Value::I64(7)]).unwrap(),
            Value::I64(7)
        );
        let cond = Expr::Call(
            "if".to_string(),
            vec![Expr::lit(1i64), Expr::lit("y"), Expr::lit("n")],
        );
        assert_eq!(eval(&cond, &r).unwrap(), Value::Str("y".into()));
        assert!(eval_call("nope", vec![]).is_err());
    }
}

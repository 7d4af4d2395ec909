//! # Loose Comparison
//!
//! Criteria values arrive as untyped JSON while ticket fields come out of
//! SQLite as integers or text, so `"5"` has to equal `5`.
//!
//! [`loose_cmp`] is a total order used for `orderby` and for `>`/`<`. Values
//! are ranked by kind first, then compared inside their kind:
//!
//! | kind    | members                                      | within the kind |
//! |---------|----------------------------------------------|-----------------|
//! | null    | null, absent fields                          | all equal       |
//! | numeric | numbers, numeric strings, bools as `0`/`1`   | exact numeric   |
//! | text    | every other string, arrays and objects       | bytewise        |
//!
//! `null < numeric < text`.
//!
//! [`loose_eq`] is the `=` of the criteria language. It agrees with
//! [`loose_cmp`] except that a bool equals any value of the same
//! truthiness. Falsy values are `0`, `""` and `"0"`.

use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn numeric_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$")
            .expect("numeric pattern is valid")
    })
}

/// Numeric value of a string such as `" 12"`, `"-3.5"` or `"1e3"`.
pub fn numeric_str(s: &str) -> Option<f64> {
    if numeric_pattern().is_match(s) {
        s.trim().parse::<f64>().ok()
    } else {
        None
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A number kept exact where it is integral.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i128),
    Float(f64),
}

/// Sort key of a value: its kind, then its position inside the kind.
#[derive(Debug)]
enum Key<'a> {
    Null,
    Numeric(Num),
    Text(std::borrow::Cow<'a, str>),
}

fn key(v: &Value) -> Key<'_> {
    match v {
        Value::Null => Key::Null,
        Value::Bool(b) => Key::Numeric(Num::Int(i128::from(*b))),
        Value::Number(n) => Key::Numeric(number(n)),
        Value::String(s) => match numeric(s) {
            Some(num) => Key::Numeric(num),
            None => Key::Text(s.as_str().into()),
        },
        other => Key::Text(other.to_string().into()),
    }
}

fn number(n: &serde_json::Number) -> Num {
    if let Some(i) = n.as_i64() {
        Num::Int(i.into())
    } else if let Some(u) = n.as_u64() {
        Num::Int(u.into())
    } else {
        Num::Float(n.as_f64().unwrap_or(0.0))
    }
}

fn numeric(s: &str) -> Option<Num> {
    let f = numeric_str(s)?;
    match s.trim().trim_start_matches('+').parse::<i128>() {
        Ok(i) => Some(Num::Int(i)),
        Err(_) => Some(Num::Float(f)),
    }
}

fn rank(k: &Key<'_>) -> u8 {
    match k {
        Key::Null => 0,
        Key::Numeric(_) => 1,
        Key::Text(_) => 2,
    }
}

/// Ordering of two values. Total: reflexive, antisymmetric and transitive
/// over every JSON value, so it is safe to hand to `sort_by`.
pub fn loose_cmp(a: &Value, b: &Value) -> Ordering {
    let (ka, kb) = (key(a), key(b));
    match (&ka, &kb) {
        (Key::Numeric(x), Key::Numeric(y)) => cmp_num(*x, *y),
        (Key::Text(x), Key::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        _ => rank(&ka).cmp(&rank(&kb)),
    }
}

/// `=` of the criteria language.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => truthy(a) == truthy(b),
        _ => loose_cmp(a, b) == Ordering::Equal,
    }
}

fn cmp_num(x: Num, y: Num) -> Ordering {
    match (x, y) {
        (Num::Int(a), Num::Int(b)) => a.cmp(&b),
        (Num::Float(a), Num::Float(b)) => cmp_f64(a, b),
        (Num::Int(a), Num::Float(b)) => cmp_int_float(a, b),
        (Num::Float(a), Num::Int(b)) => cmp_int_float(b, a).reverse(),
    }
}

/// Exact comparison of an integer with a float, without rounding the
/// integer through `f64`.
fn cmp_int_float(i: i128, f: f64) -> Ordering {
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0; // 2^127
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i128)) {
        Ordering::Equal => cmp_f64(0.0, f - whole),
        other => other,
    }
}

// JSON numbers and numeric strings never produce NaN.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

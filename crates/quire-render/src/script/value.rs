//! Dynamic value semantics over [`serde_json::Value`].
//!
//! Template data is JSON-shaped, so scripts operate on `Value` directly.
//! Conversions follow the loose rules template authors expect:
//!
//! | Value | truthy | text |
//! |-------|--------|------|
//! | `null` | no | `""` |
//! | `true` / `false` | yes / no | `"1"` / `""` |
//! | `0`, `0.0` | no | `"0"` |
//! | `""`, `"0"` | no | itself |
//! | `[]`, `{}` | no | JSON |

use std::cmp::Ordering;
use std::mem;

use serde_json::{Map, Number, Value};

use super::ast::BinaryOp;
use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        }
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// String form used when a value is written to output.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => number_text(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn number_text(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    let f = n.as_f64().unwrap_or(0.0);
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn parse_numeric(text: &str) -> Option<Num> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<i64>()
        .map(Num::Int)
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Num::Float))
}

/// Numeric view of values that have one: numbers, numeric strings, bools, null.
fn numeric(value: &Value) -> Option<Num> {
    match value {
        Value::Null => Some(Num::Int(0)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Number(n) => Some(
            n.as_i64()
                .map(Num::Int)
                .unwrap_or_else(|| Num::Float(n.as_f64().unwrap_or(0.0))),
        ),
        Value::String(s) => parse_numeric(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric coercion for arithmetic; non-numeric values count as zero.
pub(crate) fn to_num(value: &Value) -> Num {
    numeric(value).unwrap_or(Num::Int(0))
}

pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), _) => *x == truthy(b),
        (_, Value::Bool(y)) => truthy(a) == *y,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, other) | (other, Value::Null) => !truthy(other),
        (Value::String(x), Value::String(y)) => match (parse_numeric(x), parse_numeric(y)) {
            (Some(p), Some(q)) => num_cmp(p, q) == Ordering::Equal,
            _ => x == y,
        },
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            match (numeric(a), numeric(b), parse_numeric(s)) {
                (Some(p), Some(q), Some(_)) => num_cmp(p, q) == Ordering::Equal,
                _ => to_text(a) == to_text(b),
            }
        }
        (Value::Number(_), Value::Number(_)) => match (numeric(a), numeric(b)) {
            (Some(p), Some(q)) => num_cmp(p, q) == Ordering::Equal,
            _ => false,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| loose_eq(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => false,
    }
}

fn num_cmp(a: Num, b: Num) -> Ordering {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.cmp(&y),
        _ => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`.
///
/// Values compare numerically when both have a numeric form, arrays by
/// length, and everything else by text.
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Value::Array(x), Value::Array(y)) = (a, b) {
        return x.len().cmp(&y.len());
    }
    match (numeric(a), numeric(b)) {
        (Some(p), Some(q)) => num_cmp(p, q),
        _ => to_text(a).cmp(&to_text(b)),
    }
}

/// Evaluates an arithmetic or string operator on two values.
pub(crate) fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, ExecutionError> {
    if op == BinaryOp::Concat {
        let mut text = to_text(a);
        text.push_str(&to_text(b));
        return Ok(Value::String(text));
    }
    let (x, y) = (to_num(a), to_num(b));
    let result = match (op, x, y) {
        (BinaryOp::Add, Num::Int(p), Num::Int(q)) => p
            .checked_add(q)
            .map_or(Num::Float(p as f64 + q as f64), Num::Int),
        (BinaryOp::Sub, Num::Int(p), Num::Int(q)) => p
            .checked_sub(q)
            .map_or(Num::Float(p as f64 - q as f64), Num::Int),
        (BinaryOp::Mul, Num::Int(p), Num::Int(q)) => p
            .checked_mul(q)
            .map_or(Num::Float(p as f64 * q as f64), Num::Int),
        (BinaryOp::Add, _, _) => Num::Float(x.as_f64() + y.as_f64()),
        (BinaryOp::Sub, _, _) => Num::Float(x.as_f64() - y.as_f64()),
        (BinaryOp::Mul, _, _) => Num::Float(x.as_f64() * y.as_f64()),
        (BinaryOp::Div, _, _) => {
            if y.as_f64() == 0.0 {
                return Err(ExecutionError::DivisionByZero);
            }
            match (x, y) {
                (Num::Int(p), Num::Int(q)) if p.checked_rem(q) == Some(0) => {
                    p.checked_div(q).map_or(Num::Float(p as f64 / q as f64), Num::Int)
                }
                _ => Num::Float(x.as_f64() / y.as_f64()),
            }
        }
        (BinaryOp::Mod, _, _) => {
            let (p, q) = (x.as_f64() as i64, y.as_f64() as i64);
            if q == 0 {
                return Err(ExecutionError::DivisionByZero);
            }
            Num::Int(p.wrapping_rem(q))
        }
        _ => return Ok(Value::Null),
    };
    Ok(result.into_value())
}

/// Reads `base[key]`; missing entries read as null.
pub(crate) fn index(base: &Value, key: &Value) -> Value {
    match base {
        Value::Array(items) => match numeric(key) {
            Some(Num::Int(i)) if i >= 0 => items.get(i as usize).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Value::Object(map) => map.get(&to_text(key)).cloned().unwrap_or(Value::Null),
        Value::String(s) => match numeric(key) {
            Some(Num::Int(i)) if i >= 0 => s
                .chars()
                .nth(i as usize)
                .map_or(Value::Null, |c| Value::String(c.to_string())),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Reads `base->name`.
pub(crate) fn property(base: &Value, name: &str) -> Value {
    match base {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Key/value pairs for `foreach`; non-iterable values yield nothing.
pub(crate) fn entries(value: &Value) -> Vec<(Value, Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v.clone()))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn is_iterable(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

pub(crate) fn count(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 1,
    }
}

/// Writes `value` at `path` below `slot`, creating containers on the way.
///
/// A `None` key appends. Writing a string key into a list turns the list
/// into a map keyed by position.
pub(crate) fn set_path(
    slot: &mut Value,
    path: &[Option<Value>],
    value: Value,
) -> Result<(), ExecutionError> {
    let Some((key, rest)) = path.split_first() else {
        *slot = value;
        return Ok(());
    };

    if slot.is_null() {
        *slot = match key {
            Some(Value::String(s)) if parse_numeric(s).is_none() => Value::Object(Map::new()),
            _ => Value::Array(Vec::new()),
        };
    }
    let reindex = match (&*slot, key) {
        (Value::Array(items), Some(key)) => !matches!(
            numeric(key),
            Some(Num::Int(i)) if i >= 0 && (i as usize) <= items.len()
        ),
        _ => false,
    };
    if reindex {
        if let Value::Array(items) = mem::take(slot) {
            *slot = Value::Object(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            );
        }
    }

    match slot {
        Value::Array(items) => {
            let position = match key.as_ref().and_then(numeric) {
                Some(Num::Int(i)) => i as usize,
                _ => items.len(),
            };
            if position == items.len() {
                items.push(Value::Null);
            }
            set_path(&mut items[position], rest, value)
        }
        Value::Object(map) => {
            let name = match key {
                Some(key) => to_text(key),
                None => map.len().to_string(),
            };
            set_path(map.entry(name).or_insert(Value::Null), rest, value)
        }
        _ => Err(ExecutionError::InvalidAssignment),
    }
}

/// HTML-escapes the text form of a value.
pub(crate) fn escape_html(value: &Value) -> String {
    escape_str(&to_text(value))
}

/// HTML-escapes `&`, `<`, `>` and both quote characters.
pub(crate) fn escape_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

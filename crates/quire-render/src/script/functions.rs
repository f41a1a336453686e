//! Builtin functions callable from compiled scripts.

use serde_json::Value;

use super::value::{count, escape_html, is_iterable, loose_eq, to_num, to_text, truthy, Num};
use crate::error::ExecutionError;

/// Upper bound on the length of lists produced by `range()`.
const MAX_RANGE: i64 = 100_000;

fn invalid(function: &str, message: impl Into<String>) -> ExecutionError {
    ExecutionError::InvalidArgument {
        function: function.to_string(),
        message: message.into(),
    }
}

fn arg<'a>(name: &str, args: &'a [Value], position: usize) -> Result<&'a Value, ExecutionError> {
    args.get(position)
        .ok_or_else(|| invalid(name, format!("missing argument {}", position + 1)))
}

fn int_arg(name: &str, args: &[Value], position: usize) -> Result<i64, ExecutionError> {
    match to_num(arg(name, args, position)?) {
        Num::Int(i) => Ok(i),
        Num::Float(f) => Ok(f as i64),
    }
}

/// Calls the builtin `name` with evaluated arguments.
pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, ExecutionError> {
    let value = match name {
        "e" => Value::String(escape_html(args.first().unwrap_or(&Value::Null))),
        "count" => Value::from(count(arg(name, args, 0)?)),
        "empty" => Value::Bool(!truthy(args.first().unwrap_or(&Value::Null))),
        "isset" => Value::Bool(!args.is_empty() && args.iter().all(|v| !v.is_null())),
        "is_array" | "is_iterable" => Value::Bool(is_iterable(arg(name, args, 0)?)),
        "strtoupper" => Value::String(to_text(arg(name, args, 0)?).to_uppercase()),
        "strtolower" => Value::String(to_text(arg(name, args, 0)?).to_lowercase()),
        "ucfirst" => {
            let text = to_text(arg(name, args, 0)?);
            let mut chars = text.chars();
            Value::String(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            })
        }
        "trim" => Value::String(to_text(arg(name, args, 0)?).trim().to_string()),
        "strlen" => Value::from(to_text(arg(name, args, 0)?).chars().count()),
        "implode" | "join" => {
            let separator = to_text(arg(name, args, 0)?);
            let parts: Vec<String> = match arg(name, args, 1)? {
                Value::Array(items) => items.iter().map(to_text).collect(),
                Value::Object(map) => map.values().map(to_text).collect(),
                other => return Err(invalid(name, format!("expected a list, got {other}"))),
            };
            Value::String(parts.join(&separator))
        }
        "in_array" => {
            let needle = arg(name, args, 0)?;
            let found = match arg(name, args, 1)? {
                Value::Array(items) => items.iter().any(|v| loose_eq(v, needle)),
                Value::Object(map) => map.values().any(|v| loose_eq(v, needle)),
                _ => false,
            };
            Value::Bool(found)
        }
        "array_keys" => match arg(name, args, 0)? {
            Value::Array(items) => (0..items.len()).map(Value::from).collect(),
            Value::Object(map) => map.keys().cloned().map(Value::String).collect(),
            _ => Value::Array(Vec::new()),
        },
        "range" => {
            let start = int_arg(name, args, 0)?;
            let end = int_arg(name, args, 1)?;
            let step = if args.len() > 2 {
                int_arg(name, args, 2)?
                    .checked_abs()
                    .ok_or_else(|| invalid(name, "step is out of range"))?
            } else {
                1
            };
            if step == 0 {
                return Err(invalid(name, "step must not be zero"));
            }
            let span = end
                .checked_sub(start)
                .and_then(i64::checked_abs)
                .ok_or_else(|| invalid(name, "range is too large"))?;
            if span / step > MAX_RANGE {
                return Err(invalid(name, "range is too large"));
            }
            let step = usize::try_from(step).map_err(|_| invalid(name, "step is out of range"))?;
            let values: Vec<Value> = if start <= end {
                (start..=end).step_by(step).map(Value::from).collect()
            } else {
                (end..=start).rev().step_by(step).map(Value::from).collect()
            };
            Value::Array(values)
        }
        "json_encode" => Value::String(arg(name, args, 0)?.to_string()),
        _ => return Err(ExecutionError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_null_is_empty() {
        assert_eq!(call("e", &[Value::Null]).unwrap(), json!(""));
        assert_eq!(call("e", &[json!("<b>")]).unwrap(), json!("&lt;b&gt;"));
    }

    #[test]
    fn test_collection_helpers() {
        assert_eq!(call("count", &[json!([1, 2, 3])]).unwrap(), json!(3));
        assert_eq!(call("empty", &[json!([])]).unwrap(), json!(true));
        assert_eq!(call("isset", &[json!(0), Value::Null]).unwrap(), json!(false));
        assert_eq!(
            call("implode", &[json!(", "), json!(["a", "b"])]).unwrap(),
            json!("a, b")
        );
        assert_eq!(call("in_array", &[json!("2"), json!([1, 2])]).unwrap(), json!(true));
        assert_eq!(call("array_keys", &[json!({"a": 1})]).unwrap(), json!(["a"]));
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", &[json!(1), json!(3)]).unwrap(), json!([1, 2, 3]));
        assert_eq!(call("range", &[json!(3), json!(1)]).unwrap(), json!([3, 2, 1]));
        assert_eq!(
            call("range", &[json!(0), json!(10), json!(5)]).unwrap(),
            json!([0, 5, 10])
        );
        assert!(call("range", &[json!(0), json!(10_000_000)]).is_err());
    }

    #[test]
    fn test_range_extreme_bounds_are_errors() {
        let huge = call(
            "range",
            &[json!(-9_000_000_000_000_000_000i64), json!(9_000_000_000_000_000_000i64)],
        );
        assert!(matches!(huge, Err(ExecutionError::InvalidArgument { .. })));

        let step = call("range", &[json!(0), json!(5), json!(i64::MIN)]);
        assert!(matches!(step, Err(ExecutionError::InvalidArgument { .. })));
    }

    #[test]
    fn test_strings() {
        assert_eq!(call("ucfirst", &[json!("élan")]).unwrap(), json!("Élan"));
        assert_eq!(call("strtoupper", &[json!("ab")]).unwrap(), json!("AB"));
        assert_eq!(call("strlen", &[json!("héllo")]).unwrap(), json!(5));
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            call("system", &[]),
            Err(ExecutionError::UnknownFunction(_))
        ));
    }
}

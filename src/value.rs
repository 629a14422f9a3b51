//! Helper functions for working with template values.
//!
//! All expression evaluation operates on `serde_json::Value`; the
//! functions here implement truthiness, output stringification and
//! the operator semantics the renderer and optimizer share.
//!
//! Safe strings are resolved with `Markup::plain` on entry so that a
//! value piped through `safe` or `escape` behaves exactly like the
//! string it wraps for every operation other than auto-escaping.
use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::{error::RenderError, escape::Markup, RenderResult};

/// JSON type name used in error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match Markup::plain(value) {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match Markup::plain(value) {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().map(|f| f != 0.0).unwrap_or(false)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Number of elements a value holds; strings count characters.
pub(crate) fn length(value: &Value) -> Option<usize> {
    match Markup::plain(value) {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

/// Convert a value to its output form.
///
/// Strings pass through, markup unwraps, null renders empty, numbers
/// and booleans use their canonical text form and containers render
/// with `repr`.
pub(crate) fn output_string(value: &Value) -> String {
    match Markup::plain(value) {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

/// Python style repr used when containers are printed.
pub(crate) fn repr(value: &Value) -> String {
    match Markup::plain(value) {
        Value::Null => "None".to_string(),
        Value::Bool(b) => {
            if *b {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
        }
        Value::Array(items) => {
            let inner =
                items.iter().map(repr).collect::<Vec<_>>().join(", ");
            format!("[{}]", inner)
        }
        Value::Object(map) => {
            let inner = map
                .iter()
                .map(|(k, v)| {
                    format!(
                        "'{}': {}",
                        k.replace('\\', "\\\\").replace('\'', "\\'"),
                        repr(v)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", inner)
        }
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Num::Int(i))
            } else {
                n.as_f64().map(Num::Float)
            }
        }
        _ => None,
    }
}

fn num_value(n: Num) -> Value {
    match n {
        Num::Int(i) => Value::from(i),
        Num::Float(f) => {
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
    }
}

/// Equality with numeric coercion so `1 == 1.0` holds.
pub(crate) fn eq(left: &Value, right: &Value) -> bool {
    let left = Markup::plain(left);
    let right = Markup::plain(right);
    match (as_num(left), as_num(right)) {
        (Some(a), Some(b)) => match (a, b) {
            (Num::Int(a), Num::Int(b)) => a == b,
            (Num::Int(a), Num::Float(b)) => a as f64 == b,
            (Num::Float(a), Num::Int(b)) => a == b as f64,
            (Num::Float(a), Num::Float(b)) => a == b,
        },
        _ => left == right,
    }
}

/// Ordering for comparisons; numbers, strings, booleans and arrays
/// (lexicographic) are comparable.
pub(crate) fn compare(
    left: &Value,
    right: &Value,
) -> RenderResult<Ordering> {
    let left = Markup::plain(left);
    let right = Markup::plain(right);
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        let (a, b) = match (a, b) {
            (Num::Int(a), Num::Int(b)) => return Ok(a.cmp(&b)),
            (Num::Int(a), Num::Float(b)) => (a as f64, b),
            (Num::Float(a), Num::Int(b)) => (a, b as f64),
            (Num::Float(a), Num::Float(b)) => (a, b),
        };
        return a.partial_cmp(&b).ok_or_else(|| {
            RenderError::InvalidOperands(
                "<".to_string(),
                "number".to_string(),
                "number".to_string(),
            )
        });
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(RenderError::InvalidOperands(
            "<".to_string(),
            type_name(left).to_string(),
            type_name(right).to_string(),
        )),
    }
}

/// Membership used by the `in` operator.
pub(crate) fn contains(
    container: &Value,
    item: &Value,
) -> RenderResult<bool> {
    let container = Markup::plain(container);
    let item = Markup::plain(item);
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| eq(v, item))),
        Value::String(s) => match item {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Err(RenderError::InvalidOperands(
                "in".to_string(),
                type_name(item).to_string(),
                "string".to_string(),
            )),
        },
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        _ => Err(RenderError::InvalidOperands(
            "in".to_string(),
            type_name(item).to_string(),
            type_name(container).to_string(),
        )),
    }
}

/// Materialize a value for iteration.
///
/// Maps iterate as `(key, value)` pairs and strings iterate character
/// by character.
pub(crate) fn iterate(value: &Value) -> RenderResult<Vec<Value>> {
    match Markup::plain(value) {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| {
                Value::Array(vec![Value::String(k.clone()), v.clone()])
            })
            .collect()),
        Value::String(s) => {
            Ok(s.chars().map(|c| Value::String(c.to_string())).collect())
        }
        other => Err(RenderError::NotIterable(type_name(other))),
    }
}

fn py_mod_i64(a: i64, b: i64) -> i64 {
    ((a % b) + b) % b
}

fn py_floordiv_i64(a: i64, b: i64) -> i64 {
    (a - py_mod_i64(a, b)) / b
}

fn invalid(op: &str, left: &Value, right: &Value) -> RenderError {
    RenderError::InvalidOperands(
        op.to_string(),
        type_name(left).to_string(),
        type_name(right).to_string(),
    )
}

pub(crate) fn add(left: &Value, right: &Value) -> RenderResult<Value> {
    let left = Markup::plain(left);
    let right = Markup::plain(right);
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => match (as_num(left), as_num(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => match a.checked_add(b)
            {
                Some(n) => Ok(Value::from(n)),
                None => Ok(num_value(Num::Float(a as f64 + b as f64))),
            },
            (Some(a), Some(b)) => {
                Ok(num_value(Num::Float(to_f64(a) + to_f64(b))))
            }
            _ => Err(invalid("+", left, right)),
        },
    }
}

pub(crate) fn sub(left: &Value, right: &Value) -> RenderResult<Value> {
    let left = Markup::plain(left);
    let right = Markup::plain(right);
    match (as_num(left), as_num(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => match a.checked_sub(b) {
            Some(n) => Ok(Value::from(n)),
            None => Ok(num_value(Num::Float(a as f64 - b as f64))),
        },
        (Some(a), Some(b)) => Ok(num_value(Num::Float(to_f64(a) - to_f64(b)))),
        _ => Err(invalid("-", left, right)),
    }
}

pub(crate) fn mul(left: &Value, right: &Value) -> RenderResult<Value> {
    let left = Markup::plain(left);
    let right = Markup::plain(right);
    if let (Value::String(s), Some(Num::Int(n))) = (left, as_num(right)) {
        return Ok(Value::String(s.repeat(n.max(0) as usize)));
    }
    match (as_num(left), as_num(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => match a.checked_mul(b) {
            Some(n) => Ok(Value::from(n)),
            None => Ok(num_value(Num::Float(a as f64 * b as f64))),
        },
        (Some(a), Some(b)) => Ok(num_value(Num::Float(to_f64(a) * to_f64(b)))),
        _ => Err(invalid("*", left, right)),
    }
}

/// True division always yields a float.
pub(crate) fn div(left: &Value, right: &Value) -> RenderResult<Value> {
    match (as_num(Markup::plain(left)), as_num(Markup::plain(right))) {
        (Some(a), Some(b)) => {
            let b = to_f64(b);
            if b == 0.0 {
                return Err(RenderError::Message(
                    "division by zero".to_string(),
                ));
            }
            Ok(num_value(Num::Float(to_f64(a) / b)))
        }
        _ => Err(invalid("/", left, right)),
    }
}

pub(crate) fn floordiv(left: &Value, right: &Value) -> RenderResult<Value> {
    match (as_num(Markup::plain(left)), as_num(Markup::plain(right))) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => {
            if b == 0 {
                return Err(RenderError::Message(
                    "division by zero".to_string(),
                ));
            }
            Ok(Value::from(py_floordiv_i64(a, b)))
        }
        (Some(a), Some(b)) => {
            let b = to_f64(b);
            if b == 0.0 {
                return Err(RenderError::Message(
                    "division by zero".to_string(),
                ));
            }
            Ok(num_value(Num::Float((to_f64(a) / b).floor())))
        }
        _ => Err(invalid("//", left, right)),
    }
}

/// Remainder with the sign of the divisor, matching Python.
pub(crate) fn rem(left: &Value, right: &Value) -> RenderResult<Value> {
    match (as_num(Markup::plain(left)), as_num(Markup::plain(right))) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => {
            if b == 0 {
                return Err(RenderError::Message(
                    "division by zero".to_string(),
                ));
            }
            Ok(Value::from(py_mod_i64(a, b)))
        }
        (Some(a), Some(b)) => {
            let (a, b) = (to_f64(a), to_f64(b));
            if b == 0.0 {
                return Err(RenderError::Message(
                    "division by zero".to_string(),
                ));
            }
            Ok(num_value(Num::Float(a - b * (a / b).floor())))
        }
        _ => Err(invalid("%", left, right)),
    }
}

pub(crate) fn pow(left: &Value, right: &Value) -> RenderResult<Value> {
    match (as_num(Markup::plain(left)), as_num(Markup::plain(right))) {
        (Some(Num::Int(a)), Some(Num::Int(b))) if b >= 0 => {
            let exp = b.min(u32::MAX as i64) as u32;
            match a.checked_pow(exp) {
                Some(n) => Ok(Value::from(n)),
                None => {
                    Ok(num_value(Num::Float((a as f64).powf(b as f64))))
                }
            }
        }
        (Some(a), Some(b)) => {
            Ok(num_value(Num::Float(to_f64(a).powf(to_f64(b)))))
        }
        _ => Err(invalid("**", left, right)),
    }
}

pub(crate) fn neg(value: &Value) -> RenderResult<Value> {
    let value = Markup::plain(value);
    match as_num(value) {
        Some(Num::Int(i)) => Ok(Value::from(-i)),
        Some(Num::Float(f)) => Ok(num_value(Num::Float(-f))),
        None => Err(RenderError::Message(format!(
            "bad operand type for unary -: '{}'",
            type_name(value)
        ))),
    }
}

pub(crate) fn pos(value: &Value) -> RenderResult<Value> {
    let value = Markup::plain(value);
    match as_num(value) {
        Some(_) => Ok(value.clone()),
        None => Err(RenderError::Message(format!(
            "bad operand type for unary +: '{}'",
            type_name(value)
        ))),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

/// Default attribute hook: object property access falling back to
/// item access with the name as key.
pub(crate) fn get_attr(value: &Value, name: &str) -> Option<Value> {
    let value = Markup::plain(value);
    if let Value::Object(map) = value {
        if let Some(found) = map.get(name) {
            return Some(found.clone());
        }
    }
    get_item(value, &Value::String(name.to_string()))
}

/// Default index hook for objects, arrays (negative indices wrap) and
/// strings.
pub(crate) fn get_item(value: &Value, key: &Value) -> Option<Value> {
    let key = Markup::plain(key);
    match Markup::plain(value) {
        Value::Object(map) => match key {
            Value::String(k) => map.get(k).cloned(),
            Value::Number(n) => map.get(&n.to_string()).cloned(),
            _ => None,
        },
        Value::Array(items) => {
            let idx = normalize_index(key, items.len())?;
            items.get(idx).cloned()
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(key, chars.len())?;
            chars.get(idx).map(|c| Value::String(c.to_string()))
        }
        _ => None,
    }
}

fn normalize_index(key: &Value, len: usize) -> Option<usize> {
    let idx = key.as_i64()?;
    let idx = if idx < 0 { idx + len as i64 } else { idx };
    if idx < 0 {
        None
    } else {
        Some(idx as usize)
    }
}

/// Python slice semantics over arrays and strings.
pub(crate) fn slice(
    value: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> RenderResult<Value> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RenderError::Message(
            "slice step cannot be zero".to_string(),
        ));
    }
    match Markup::plain(value) {
        Value::Array(items) => {
            let picked = slice_indexes(items.len() as i64, start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::Array(picked))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String =
                slice_indexes(chars.len() as i64, start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
            Ok(Value::String(picked))
        }
        other => Err(RenderError::Message(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn slice_indexes(
    len: i64,
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
) -> Vec<usize> {
    let norm = |idx: i64| if idx < 0 { idx + len } else { idx };
    let (mut i, end) = if step > 0 {
        let i = norm(start.unwrap_or(0)).max(0).min(len);
        let end = norm(stop.unwrap_or(len)).max(0).min(len);
        (i, end)
    } else {
        let i = match start {
            Some(s) => norm(s).max(-1).min(len - 1),
            None => len - 1,
        };
        let end = match stop {
            Some(s) => norm(s).max(-1).min(len - 1),
            None => -1,
        };
        (i, end)
    };

    let mut out = Vec::new();
    while (step > 0 && i < end) || (step < 0 && i > end) {
        out.push(i as usize);
        i += step;
    }
    out
}

/// Convert a value to a dictionary key.
pub(crate) fn to_key(value: &Value) -> RenderResult<String> {
    match Markup::plain(value) {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(RenderError::Message(format!(
            "'{}' is not a valid dictionary key",
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
    }

    #[test]
    fn output_forms() {
        assert_eq!(output_string(&json!(null)), "");
        assert_eq!(output_string(&json!(true)), "true");
        assert_eq!(output_string(&json!(3)), "3");
        assert_eq!(output_string(&json!("s")), "s");
        assert_eq!(output_string(&json!([1, "a", null])), "[1, 'a', None]");
        assert_eq!(output_string(&json!({"a": 1})), "{'a': 1}");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(add(&json!(1), &json!(2)).unwrap(), json!(3));
        assert_eq!(add(&json!("a"), &json!("b")).unwrap(), json!("ab"));
        assert_eq!(div(&json!(3), &json!(2)).unwrap(), json!(1.5));
        assert_eq!(floordiv(&json!(-7), &json!(2)).unwrap(), json!(-4));
        assert_eq!(rem(&json!(-7), &json!(2)).unwrap(), json!(1));
        assert_eq!(pow(&json!(2), &json!(10)).unwrap(), json!(1024));
        assert!(div(&json!(1), &json!(0)).is_err());
    }

    #[test]
    fn numeric_equality() {
        assert!(eq(&json!(1), &json!(1.0)));
        assert!(!eq(&json!(1), &json!("1")));
    }

    #[test]
    fn membership() {
        assert!(contains(&json!([1, 2]), &json!(2)).unwrap());
        assert!(contains(&json!("abc"), &json!("bc")).unwrap());
        assert!(contains(&json!({"a": 1}), &json!("a")).unwrap());
    }

    #[test]
    fn item_access() {
        assert_eq!(get_item(&json!([1, 2, 3]), &json!(-1)), Some(json!(3)));
        assert_eq!(get_item(&json!("abc"), &json!(1)), Some(json!("b")));
        assert_eq!(get_attr(&json!({"a": 1}), "a"), Some(json!(1)));
        assert_eq!(get_attr(&json!({"a": 1}), "b"), None);
    }

    #[test]
    fn slicing() {
        let v = json!([0, 1, 2, 3, 4]);
        assert_eq!(
            slice(&v, Some(1), Some(4), None).unwrap(),
            json!([1, 2, 3])
        );
        assert_eq!(
            slice(&v, None, None, Some(-1)).unwrap(),
            json!([4, 3, 2, 1, 0])
        );
        assert_eq!(
            slice(&json!("hello"), None, Some(2), None).unwrap(),
            json!("he")
        );
    }

    #[test]
    fn markup_behaves_like_its_string() {
        let safe = Markup::wrap("abcde");
        assert_eq!(length(&safe), Some(5));
        assert!(eq(&safe, &json!("abcde")));
        assert_eq!(iterate(&safe).unwrap().len(), 5);
        assert!(contains(&safe, &json!("c")).unwrap());
        assert_eq!(
            compare(&Markup::wrap("a"), &json!("b")).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            add(&Markup::wrap("a"), &json!("b")).unwrap(),
            json!("ab")
        );
        assert_eq!(get_item(&safe, &json!(0)), Some(json!("a")));
        assert!(!is_truthy(&Markup::wrap("")));
        assert_eq!(type_name(&safe), "string");
    }
}

//! The default filter collection.
//!
//! Registered when the `builtins` feature is enabled; the set is
//! deliberately small and pure.
use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::{
    callable::{pass_environment, plain, CallableFn, Invocation},
    error::RenderError,
    escape::Markup,
    value, RenderResult,
};

/// Seed the filter registry with the builtin collection.
pub(crate) fn register(filters: &mut HashMap<String, CallableFn>) {
    filters.insert("upper".to_string(), plain(upper));
    filters.insert("lower".to_string(), plain(lower));
    filters.insert("capitalize".to_string(), plain(capitalize));
    filters.insert("trim".to_string(), plain(trim));
    filters.insert("length".to_string(), plain(length));
    filters.insert("count".to_string(), plain(length));
    filters.insert("first".to_string(), plain(first));
    filters.insert("last".to_string(), plain(last));
    filters.insert("join".to_string(), plain(join));
    filters.insert("default".to_string(), plain(default));
    filters.insert("d".to_string(), plain(default));
    filters.insert("abs".to_string(), plain(abs));
    filters.insert("int".to_string(), plain(int));
    filters.insert("float".to_string(), plain(float));
    filters.insert("string".to_string(), plain(string));
    filters.insert("list".to_string(), plain(list));
    filters.insert("reverse".to_string(), plain(reverse));
    filters.insert("sort".to_string(), plain(sort));
    filters.insert("replace".to_string(), plain(replace));
    filters.insert("safe".to_string(), plain(safe));
    filters.insert(
        "escape".to_string(),
        pass_environment(escape_filter),
    );
    filters.insert("e".to_string(), pass_environment(escape_filter));
}

fn upper(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::String(inv.value_string()?.to_uppercase()))
}

fn lower(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::String(inv.value_string()?.to_lowercase()))
}

fn capitalize(inv: &Invocation) -> RenderResult<Value> {
    let s = inv.value_string()?.to_lowercase();
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => s,
    };
    Ok(Value::String(out))
}

fn trim(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::String(inv.value_string()?.trim().to_string()))
}

fn length(inv: &Invocation) -> RenderResult<Value> {
    let value = inv.value()?;
    match value::length(value) {
        Some(n) => Ok(Value::from(n as i64)),
        None => Err(RenderError::Message(format!(
            "object of type '{}' has no length",
            value::type_name(value)
        ))),
    }
}

fn first(inv: &Invocation) -> RenderResult<Value> {
    let items = value::iterate(inv.value()?)?;
    Ok(items.into_iter().next().unwrap_or(Value::Null))
}

fn last(inv: &Invocation) -> RenderResult<Value> {
    let items = value::iterate(inv.value()?)?;
    Ok(items.into_iter().last().unwrap_or(Value::Null))
}

fn join(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(0, 1)?;
    let sep = match inv.get(0) {
        Some(v) => value::output_string(v),
        None => String::new(),
    };
    let parts = value::iterate(inv.value()?)?
        .iter()
        .map(value::output_string)
        .collect::<Vec<_>>();
    Ok(Value::String(parts.join(&sep)))
}

/// Fall back to a default when the input is undefined; with a truthy
/// second argument falsy values fall back as well.
fn default(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(0, 2)?;
    let fallback = inv.get(0).cloned().unwrap_or_else(|| {
        Value::String(String::new())
    });
    let falsy_too = inv
        .get(1)
        .map(value::is_truthy)
        .unwrap_or(false);
    match inv.input() {
        None => Ok(fallback),
        Some(v) if falsy_too && !value::is_truthy(v) => Ok(fallback),
        Some(v) => Ok(v.clone()),
    }
}

fn abs(inv: &Invocation) -> RenderResult<Value> {
    let value = inv.value()?;
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i.abs()))
            } else if let Some(f) = n.as_f64() {
                Ok(serde_json::Number::from_f64(f.abs())
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            } else {
                Ok(value.clone())
            }
        }
        _ => Err(RenderError::Message(format!(
            "bad operand type for abs(): '{}'",
            value::type_name(value)
        ))),
    }
}

fn int(inv: &Invocation) -> RenderResult<Value> {
    let value = inv.value()?;
    let out = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    };
    Ok(Value::from(out))
}

fn float(inv: &Invocation) -> RenderResult<Value> {
    let value = inv.value()?;
    let out = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => (*b as i64) as f64,
        _ => 0.0,
    };
    Ok(serde_json::Number::from_f64(out)
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

fn string(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::String(inv.value_string()?))
}

fn list(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Array(value::iterate(inv.value()?)?))
}

fn reverse(inv: &Invocation) -> RenderResult<Value> {
    match inv.value()? {
        Value::String(s) => {
            Ok(Value::String(s.chars().rev().collect::<String>()))
        }
        other => {
            let mut items = value::iterate(other)?;
            items.reverse();
            Ok(Value::Array(items))
        }
    }
}

fn sort(inv: &Invocation) -> RenderResult<Value> {
    let mut items = value::iterate(inv.value()?)?;
    let mut failed: Option<RenderError> = None;
    items.sort_by(|a, b| match value::compare(a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failed.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failed {
        return Err(e);
    }
    let descending = inv
        .named()
        .get("reverse")
        .map(value::is_truthy)
        .unwrap_or(false);
    if descending {
        items.reverse();
    }
    Ok(Value::Array(items))
}

fn replace(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(2, 2)?;
    let s = inv.value_string()?;
    let old = value::output_string(inv.arg(0)?);
    let new = value::output_string(inv.arg(1)?);
    Ok(Value::String(s.replace(&old, &new)))
}

/// Mark a string as safe for auto-escaping.
fn safe(inv: &Invocation) -> RenderResult<Value> {
    Ok(Markup::wrap(inv.value_string()?))
}

/// Escape with the environment escape function and mark the result
/// safe.
fn escape_filter(
    env: &crate::environment::Environment,
    inv: &Invocation,
) -> RenderResult<Value> {
    // The raw input keeps the markup wrapper, so already safe
    // strings pass through without escaping twice.
    if let Some(raw) = inv.input() {
        if Markup::is_markup(raw) {
            return Ok(raw.clone());
        }
    }
    let escaped = (env.escape_fn())(&inv.value_string()?);
    Ok(Markup::wrap(escaped))
}

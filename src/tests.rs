//! The default test collection.
//!
//! Registered when the `builtins` feature is enabled. Tests receive
//! the tested value as their input and return a boolean.
use std::collections::HashMap;

use serde_json::Value;

use crate::{
    callable::{plain, CallableFn, Invocation},
    error::RenderError,
    value, RenderResult,
};

/// Seed the test registry with the builtin collection.
pub(crate) fn register(tests: &mut HashMap<String, CallableFn>) {
    tests.insert("defined".to_string(), plain(defined));
    tests.insert("undefined".to_string(), plain(undefined));
    tests.insert("none".to_string(), plain(none));
    tests.insert("even".to_string(), plain(even));
    tests.insert("odd".to_string(), plain(odd));
    tests.insert("divisibleby".to_string(), plain(divisibleby));
    tests.insert("number".to_string(), plain(number));
    tests.insert("string".to_string(), plain(string));
    tests.insert("boolean".to_string(), plain(boolean));
    tests.insert("sequence".to_string(), plain(sequence));
    tests.insert("mapping".to_string(), plain(mapping));
    tests.insert("iterable".to_string(), plain(iterable));
    tests.insert("eq".to_string(), plain(eq));
    tests.insert("equalto".to_string(), plain(eq));
    tests.insert("in".to_string(), plain(in_test));
    tests.insert("lower".to_string(), plain(lower));
    tests.insert("upper".to_string(), plain(upper));
}

fn defined(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(inv.input().is_some()))
}

fn undefined(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(inv.input().is_none()))
}

fn none(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(inv.input(), Some(Value::Null))))
}

fn integer_input(inv: &Invocation) -> RenderResult<i64> {
    match inv.value()? {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Ok(n.as_i64().unwrap_or(0))
        }
        other => Err(RenderError::Message(format!(
            "Test '{}' expects an integer, got {}",
            inv.name(),
            value::type_name(other)
        ))),
    }
}

fn even(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(integer_input(inv)? % 2 == 0))
}

fn odd(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(integer_input(inv)? % 2 != 0))
}

fn divisibleby(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(1, 1)?;
    let n = integer_input(inv)?;
    let by = inv.arg(0)?.as_i64().ok_or_else(|| {
        RenderError::Message(
            "Test 'divisibleby' expects an integer argument".to_string(),
        )
    })?;
    if by == 0 {
        return Err(RenderError::Message("division by zero".to_string()));
    }
    Ok(Value::Bool(n % by == 0))
}

fn number(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(inv.value()?, Value::Number(_))))
}

fn string(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(inv.value()?, Value::String(_))))
}

fn boolean(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(inv.value()?, Value::Bool(_))))
}

fn sequence(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(
        inv.value()?,
        Value::Array(_) | Value::String(_)
    )))
}

fn mapping(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(inv.value()?, Value::Object(_))))
}

fn iterable(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Bool(matches!(
        inv.value()?,
        Value::Array(_) | Value::Object(_) | Value::String(_)
    )))
}

fn eq(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(1, 1)?;
    Ok(Value::Bool(value::eq(inv.value()?, inv.arg(0)?)))
}

fn in_test(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(1, 1)?;
    Ok(Value::Bool(value::contains(inv.arg(0)?, inv.value()?)?))
}

fn lower(inv: &Invocation) -> RenderResult<Value> {
    let s = inv.value_string()?;
    Ok(Value::Bool(!s.chars().any(|c| c.is_uppercase())))
}

fn upper(inv: &Invocation) -> RenderResult<Value> {
    let s = inv.value_string()?;
    Ok(Value::Bool(!s.chars().any(|c| c.is_lowercase())))
}

//! The default global function collection.
use std::collections::HashMap;

use serde_json::Value;

use crate::{
    callable::{plain, Invocation},
    environment::Global,
    error::RenderError,
    RenderResult,
};

/// Upper bound on materialized ranges.
const MAX_RANGE: i64 = 1_000_000;

/// Seed the globals registry with the builtin functions.
pub(crate) fn register(globals: &mut HashMap<String, Global>) {
    globals.insert("range".to_string(), Global::Function(plain(range)));
    globals.insert("dict".to_string(), Global::Function(plain(dict)));
}

/// `range(stop)`, `range(start, stop)` or `range(start, stop, step)`.
fn range(inv: &Invocation) -> RenderResult<Value> {
    inv.arity(1, 3)?;
    let int_arg = |index: usize| -> RenderResult<i64> {
        inv.arg(index)?.as_i64().ok_or_else(|| {
            RenderError::Message(
                "range() arguments must be integers".to_string(),
            )
        })
    };
    let (start, stop) = if inv.args().len() == 1 {
        (0, int_arg(0)?)
    } else {
        (int_arg(0)?, int_arg(1)?)
    };
    let step = if inv.args().len() == 3 { int_arg(2)? } else { 1 };
    if step == 0 {
        return Err(RenderError::Message(
            "range() step argument must not be zero".to_string(),
        ));
    }

    let mut out = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        out.push(Value::from(current));
        if out.len() as i64 > MAX_RANGE {
            return Err(RenderError::Message(
                "range() result is too large".to_string(),
            ));
        }
        current += step;
    }
    Ok(Value::Array(out))
}

/// Build a mapping from keyword arguments: `dict(a=1, b=2)`.
fn dict(inv: &Invocation) -> RenderResult<Value> {
    Ok(Value::Object(inv.named().clone()))
}

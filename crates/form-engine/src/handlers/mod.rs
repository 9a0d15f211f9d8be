//! Per-node-kind evaluation handlers. Each submodule implements one AST node
//! kind's contract; [`crate::invoker::invoke`] dispatches into them.

pub mod conditional;
pub mod format;
pub mod function;
pub mod iterate;
pub mod next;
pub mod pipeline;
pub mod predicate;
pub mod pseudo;
pub mod reference;
pub mod validation;

use crate::error::{ErrorKind, EvalError};
use form_ast::NodeId;
use serde_json::Value;

pub const UNSAFE_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Truthiness per the engine's boolean coercion: `null`/`false`/`0`/`""`/empty
/// array/empty object are falsy, everything else truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Walk `rest` through `base` via safe property access: rejects
/// `__proto__`/`constructor`/`prototype` at any step, accepts numeric-string
/// array indices, and treats a missing intermediate as `undefined` rather
/// than an error.
pub fn safe_walk(base: &Value, rest: &[String], node: NodeId) -> Result<Value, EvalError> {
    let mut current = base.clone();
    for key in rest {
        if UNSAFE_KEYS.contains(&key.as_str()) {
            return Err(EvalError::at(ErrorKind::SecurityViolation, node, format!("unsafe property key '{key}'")));
        }
        current = match &current {
            Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
            Value::Array(items) => match key.parse::<usize>() {
                Ok(i) => items.get(i).cloned().unwrap_or(Value::Null),
                Err(_) => Value::Null,
            },
            Value::Null => Value::Null,
            _ => Value::Null,
        };
    }
    Ok(current)
}

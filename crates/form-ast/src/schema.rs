//! Schema + serializability validation, run before AST compilation.
//!
//! The author-facing contract (spec.md §6) requires the whole journey to be a
//! finite, acyclic structure of primitives/objects/arrays with the minimal
//! shape the compiler depends on. `serde_json::Value` already rules out
//! functions, symbols, and circular references by construction, so this pass
//! focuses on depth-bounding (a pathological author payload shouldn't blow
//! the DFS stack) and the structural contract each node kind depends on.

use crate::error::SchemaIssue;
use serde_json::Value;

/// Depth past which a JSON document is rejected outright, independent of any
/// other check. Guards the recursive-descent compiler against stack
/// exhaustion on adversarial input.
pub const MAX_DEPTH: usize = 256;

pub fn validate_serializable(value: &Value) -> Result<(), Vec<SchemaIssue>> {
    let mut issues = Vec::new();
    check_depth(value, "", 0, &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_depth(value: &Value, path: &str, depth: usize, issues: &mut Vec<SchemaIssue>) {
    if depth > MAX_DEPTH {
        issues.push(SchemaIssue::new(path, format!("exceeds maximum nesting depth of {}", MAX_DEPTH)));
        return;
    }
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                check_depth(item, &format!("{path}/{i}"), depth + 1, issues);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                check_depth(v, &format!("{path}/{k}"), depth + 1, issues);
            }
        }
        _ => {}
    }
}

/// Minimal structural validation of a journey document: required
/// discriminators and keys the compiler cannot proceed without. This is
/// deliberately not a full JSON-Schema implementation — it exists to turn a
/// malformed document into an aggregated `SchemaViolation` with per-field
/// paths instead of an opaque compiler panic.
pub fn validate_journey_shape(value: &Value) -> Result<(), Vec<SchemaIssue>> {
    let mut issues = Vec::new();
    validate_journey_at(value, "", &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn require_str<'a>(obj: &'a Value, key: &str, path: &str, issues: &mut Vec<SchemaIssue>) -> Option<&'a str> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) => Some(s),
        None => {
            issues.push(SchemaIssue::new(format!("{path}/{key}"), "expected a string"));
            None
        }
    }
}

fn require_array<'a>(obj: &'a Value, key: &str, path: &str) -> &'a [Value] {
    obj.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn validate_journey_at(value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    let Some(obj) = value.as_object() else {
        issues.push(SchemaIssue::new(path, "expected an object"));
        return;
    };
    if obj.get("type").and_then(Value::as_str) != Some("journey") {
        issues.push(SchemaIssue::new(format!("{path}/type"), "expected \"journey\""));
    }
    require_str(value, "code", path, issues);
    require_str(value, "title", path, issues);

    for (i, step) in require_array(value, "steps", path).iter().enumerate() {
        validate_step_at(step, &format!("{path}/steps/{i}"), issues);
    }
    for (i, child) in require_array(value, "children", path).iter().enumerate() {
        validate_journey_at(child, &format!("{path}/children/{i}"), issues);
    }
}

fn validate_step_at(value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    let Some(obj) = value.as_object() else {
        issues.push(SchemaIssue::new(path, "expected an object"));
        return;
    };
    if obj.get("type").and_then(Value::as_str) != Some("step") {
        issues.push(SchemaIssue::new(format!("{path}/type"), "expected \"step\""));
    }
    require_str(value, "path", path, issues);
    require_str(value, "title", path, issues);

    for (i, block) in require_array(value, "blocks", path).iter().enumerate() {
        validate_block_at(block, &format!("{path}/blocks/{i}"), issues);
    }
}

fn validate_block_at(value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    let Some(obj) = value.as_object() else {
        issues.push(SchemaIssue::new(path, "expected an object"));
        return;
    };
    if obj.get("type").and_then(Value::as_str) != Some("block") {
        issues.push(SchemaIssue::new(format!("{path}/type"), "expected \"block\""));
    }
    require_str(value, "variant", path, issues);
    let block_type = obj.get("blockType").and_then(Value::as_str);
    match block_type {
        Some("field") => {
            if obj.get("code").and_then(Value::as_str).is_none() {
                issues.push(SchemaIssue::new(format!("{path}/code"), "field blocks require a string code"));
            }
        }
        Some("basic") => {}
        _ => issues.push(SchemaIssue::new(format!("{path}/blockType"), "expected \"field\" or \"basic\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_a_minimal_valid_journey() {
        let doc = json!({
            "type": "journey",
            "code": "apply",
            "title": "Apply",
            "steps": [],
            "children": [],
        });
        assert!(validate_journey_shape(&doc).is_ok());
    }

    #[test]
    fn rejects_missing_step_path() {
        let doc = json!({
            "type": "journey",
            "code": "apply",
            "title": "Apply",
            "steps": [ { "type": "step", "title": "Start", "blocks": [] } ],
        });
        let err = validate_journey_shape(&doc).unwrap_err();
        assert!(err.iter().any(|i| i.path.ends_with("/path")));
    }

    #[test]
    fn rejects_field_block_missing_code() {
        let doc = json!({
            "type": "journey", "code": "apply", "title": "Apply",
            "steps": [{
                "type": "step", "path": "/start", "title": "Start",
                "blocks": [{ "type": "block", "variant": "text", "blockType": "field" }],
            }],
        });
        let err = validate_journey_shape(&doc).unwrap_err();
        assert!(err.iter().any(|i| i.path.ends_with("/code")));
    }
}

//! Literal values and the literal-or-child-node union used throughout the AST.

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON-compatible literal carried inline on an AST node (as opposed to a
/// child expression, which is referenced by [`NodeId`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Literal>),
    Object(BTreeMap<String, Literal>),
}

impl Literal {
    pub fn is_truthy(&self) -> bool {
        match self {
            Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Number(n) => *n != 0.0,
            Literal::String(s) => !s.is_empty(),
            Literal::Array(a) => !a.is_empty(),
            Literal::Object(o) => !o.is_empty(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Literal::Null,
            serde_json::Value::Bool(b) => Literal::Bool(*b),
            serde_json::Value::Number(n) => Literal::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Literal::String(s.clone()),
            serde_json::Value::Array(a) => Literal::Array(a.iter().map(Literal::from_json).collect()),
            serde_json::Value::Object(o) => Literal::Object(
                o.iter()
                    .map(|(k, v)| (k.clone(), Literal::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Null => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Number(n) => serde_json::json!(n),
            Literal::String(s) => serde_json::Value::String(s.clone()),
            Literal::Array(a) => serde_json::Value::Array(a.iter().map(Literal::to_json).collect()),
            Literal::Object(o) => {
                serde_json::Value::Object(o.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

/// Many author-JSON properties accept either a literal value or a nested
/// expression node (e.g. a field's `defaultValue`, a `Next`'s `goto`). This is
/// the AST-level representation of that union: literals stay inline, AST
/// children are referenced by stable ID so the node registry remains the sole
/// owner of child nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueOrNode {
    Literal(Literal),
    Node(NodeId),
}

impl ValueOrNode {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ValueOrNode::Node(id) => Some(*id),
            ValueOrNode::Literal(_) => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, ValueOrNode::Node(_))
    }
}

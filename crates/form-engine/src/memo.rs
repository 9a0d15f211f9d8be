//! The per-request memoization cache: node ID plus active scope identities.

use crate::error::EvalError;
use form_ast::NodeId;
use serde_json::Value;
use std::collections::HashMap;

pub type EvalResult = Result<Value, EvalError>;

#[derive(Debug, Clone, Default)]
pub struct MemoCache {
    entries: HashMap<(NodeId, Vec<u64>), EvalResult>,
    hits: u64,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, node: NodeId, scope: &[u64]) -> Option<EvalResult> {
        let hit = self.entries.get(&(node, scope.to_vec())).cloned();
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    pub fn insert(&mut self, node: NodeId, scope: &[u64], result: EvalResult) {
        self.entries.insert((node, scope.to_vec()), result);
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! The three compile-time registries: node, pseudo, and metadata.
//!
//! All three are append-only within a compilation. Runtime node creation
//! (iteration, composite-block expansion) extends a *clone* of the
//! compile-time registry rather than mutating it in place, so the frozen
//! compile-time structures stay shared and read-only across requests while
//! each request evolves its own copy.

use crate::ids::NodeId;
use crate::node::{AstNode, TaggedChild};
use crate::pseudo::{PseudoKey, PseudoNode};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node {0} is already registered")]
    DuplicateNode(NodeId),
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),
}

/// ID → AST node.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, AstNode>,
    /// Insertion order, preserved for deterministic traversal/debug output.
    order: Vec<NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: AstNode) -> Result<(), RegistryError> {
        if self.nodes.contains_key(&node.id) {
            return Err(RegistryError::DuplicateNode(node.id));
        }
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&AstNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn children_of(&self, id: NodeId) -> Vec<TaggedChild> {
        self.get(id).map(|n| n.kind.children()).unwrap_or_default()
    }

    /// Clone-on-extend: a per-request runtime registry starts as a full copy
    /// of the frozen compile-time registry and accumulates runtime nodes from
    /// there on, leaving the original untouched.
    pub fn extend_for_request(&self) -> NodeRegistry {
        self.clone()
    }
}

/// `(PseudoNodeType, externalKey)` → pseudo node, in its own namespace.
#[derive(Debug, Clone, Default)]
pub struct PseudoRegistry {
    by_key: HashMap<PseudoKey, NodeId>,
    by_id: HashMap<NodeId, PseudoNode>,
}

impl PseudoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pseudo node, coalescing duplicates by key (idempotent).
    pub fn get_or_insert_with(&mut self, key: PseudoKey, mint: impl FnOnce() -> NodeId) -> NodeId {
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = mint();
        self.by_id.insert(id, PseudoNode { id, key: key.clone() });
        self.by_key.insert(key, id);
        id
    }

    pub fn lookup(&self, key: &PseudoKey) -> Option<NodeId> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&PseudoNode> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn extend_for_request(&self) -> PseudoRegistry {
        self.clone()
    }
}

/// Compilation-specific facts about a node, orthogonal to the frozen AST.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    pub attached_to_parent_node: Option<NodeId>,
    pub attached_to_parent_property: Option<(String, Option<usize>)>,
    pub is_ancestor_of_step: bool,
    pub is_descendant_of_step: bool,
    pub is_current_step: bool,
}

/// ID → metadata facts, as computed by a step-scoped traversal.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: HashMap<NodeId, NodeMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, id: NodeId) -> &mut NodeMetadata {
        self.entries.entry(id).or_default()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeMetadata> {
        self.entries.get(&id)
    }

    /// Walk the `attachedToParentNode` chain to the root. The chain always
    /// terminates since the AST forbids structural sharing; callers get the
    /// full path for diagnostics.
    pub fn ancestor_chain(&self, mut id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        while let Some(meta) = self.entries.get(&id) {
            match meta.attached_to_parent_node {
                Some(parent) if !chain.contains(&parent) => {
                    chain.push(parent);
                    id = parent;
                }
                _ => break,
            }
        }
        chain
    }

    pub fn extend_for_request(&self) -> MetadataRegistry {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeCategory;
    use crate::node::{AstNodeKind, ReferenceNode};

    fn ref_node(id: NodeId) -> AstNode {
        AstNode::new(id, AstNodeKind::Reference(ReferenceNode { path: vec!["answers".into(), "x".into()] }))
    }

    #[test]
    fn node_registry_is_append_only() {
        let mut reg = NodeRegistry::new();
        let id = NodeId::new(NodeCategory::CompileAst, 0);
        reg.insert(ref_node(id)).unwrap();
        let err = reg.insert(ref_node(id)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateNode(id));
    }

    #[test]
    fn pseudo_registry_coalesces_duplicate_keys() {
        let mut pseudo = PseudoRegistry::new();
        let mut next = 0u64;
        let key = PseudoKey::new(crate::pseudo::PseudoNodeType::Answer, "firstName");
        let a = pseudo.get_or_insert_with(key.clone(), || {
            let id = NodeId::new(NodeCategory::CompilePseudo, next);
            next += 1;
            id
        });
        let b = pseudo.get_or_insert_with(key, || {
            let id = NodeId::new(NodeCategory::CompilePseudo, next);
            next += 1;
            id
        });
        assert_eq!(a, b);
        assert_eq!(pseudo.len(), 1);
    }
}

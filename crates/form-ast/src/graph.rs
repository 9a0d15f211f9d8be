//! The data-flow dependency graph and the wiring pass that populates it.

use crate::ids::NodeId;
use crate::node::AstNodeKind;
use crate::pseudo::{PseudoKey, PseudoNodeType};
use crate::registry::{NodeRegistry, PseudoRegistry};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    DataFlow,
}

/// The semantic role an edge plays in the wiring contract: a reference
/// resolving to its external pseudo source, or a structural child feeding
/// its parent expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeMetadata {
    Reference { reference_type: String, key: String },
    Property { property: &'static str },
    PropertyIndex { property: &'static str, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub metadata: EdgeMetadata,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WiringError {
    #[error("edge endpoint {0} is not registered")]
    UnregisteredEndpoint(NodeId),
    #[error("self-loop on node {0} is forbidden")]
    SelfLoop(NodeId),
    #[error("dependency graph has a cycle reachable from step root {0}")]
    CycleDetected(NodeId),
}

/// Directed multi-graph over node IDs. Parallel edges with distinct metadata
/// are allowed; self-loops are forbidden.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: Vec<Edge>,
    adjacency: HashMap<NodeId, Vec<usize>>,
    reverse_adjacency: HashMap<NodeId, Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(
        &mut self,
        registry: &NodeRegistry,
        pseudo: &PseudoRegistry,
        edge: Edge,
    ) -> Result<(), WiringError> {
        if edge.from == edge.to {
            return Err(WiringError::SelfLoop(edge.from));
        }
        let registered = |id: NodeId| registry.contains(id) || pseudo.get(id).is_some();
        if !registered(edge.from) {
            return Err(WiringError::UnregisteredEndpoint(edge.from));
        }
        if !registered(edge.to) {
            return Err(WiringError::UnregisteredEndpoint(edge.to));
        }
        let idx = self.edges.len();
        self.adjacency.entry(edge.from).or_default().push(idx);
        self.reverse_adjacency.entry(edge.to).or_default().push(idx);
        self.edges.push(edge);
        Ok(())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| self.edges[i].to)
    }

    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.reverse_adjacency
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| self.edges[i].from)
    }

    /// Every node reachable from `root` by following edges forward
    /// (dependencies-of relation is the reverse; this follows "depends on").
    pub fn descendants_of(&self, root: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        seen.insert(root);
        while let Some(n) = queue.pop_front() {
            for succ in self.successors(n) {
                if seen.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        seen
    }

    /// Kahn's algorithm restricted to the subgraph reachable from `root`.
    /// Errors if that subgraph contains a cycle.
    pub fn topological_order(&self, root: NodeId) -> Result<Vec<NodeId>, WiringError> {
        let scope = self.descendants_of(root);
        let mut in_degree: HashMap<NodeId, usize> = scope.iter().map(|&n| (n, 0)).collect();
        for &n in &scope {
            for succ in self.successors(n) {
                if scope.contains(&succ) {
                    *in_degree.get_mut(&succ).unwrap() += 1;
                }
            }
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut order = Vec::new();
        while let Some(n) = queue.pop_front() {
            order.push(n);
            for succ in self.successors(n) {
                if let Some(d) = in_degree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        if order.len() != scope.len() {
            return Err(WiringError::CycleDetected(root));
        }
        Ok(order)
    }

    pub fn is_acyclic(&self, root: NodeId) -> bool {
        self.topological_order(root).is_ok()
    }

    pub fn extend_for_request(&self) -> DependencyGraph {
        self.clone()
    }
}

/// Produce the `DATA_FLOW` edges for every node in `registry`. Pure function
/// of the two registries; idempotent (re-wiring the same registries produces
/// the same edge set).
pub fn wire(registry: &NodeRegistry, pseudo: &PseudoRegistry) -> Result<DependencyGraph, WiringError> {
    let mut graph = DependencyGraph::new();
    for id in registry.ids() {
        wire_node(registry, pseudo, id, &mut graph)?;
    }
    Ok(graph)
}

/// Wire just the edges for a single node (used by `extendWithRuntime` to wire
/// freshly materialized runtime nodes without re-wiring the whole graph).
pub fn wire_node(
    registry: &NodeRegistry,
    pseudo: &PseudoRegistry,
    id: NodeId,
    graph: &mut DependencyGraph,
) -> Result<(), WiringError> {
    let Some(node) = registry.get(id) else {
        return Err(WiringError::UnregisteredEndpoint(id));
    };

    match &node.kind {
        AstNodeKind::Reference(r) => {
            if r.path.len() >= 2 {
                if let Some(pseudo_type) = PseudoNodeType::from_reference_type(&r.path[0]) {
                    let key = PseudoKey::new(pseudo_type, r.path[1].clone());
                    if let Some(pseudo_id) = pseudo.lookup(&key) {
                        graph.add_edge(
                            registry,
                            pseudo,
                            Edge {
                                from: pseudo_id,
                                to: id,
                                kind: EdgeKind::DataFlow,
                                metadata: EdgeMetadata::Reference {
                                    reference_type: r.path[0].clone(),
                                    key: r.path[1].clone(),
                                },
                            },
                        )?;
                    }
                    // Missing pseudo target: no edge, diagnosed as LOOKUP_FAILED at evaluation.
                }
            }
        }
        _ => {
            for child in node.kind.children() {
                let metadata = match child.index {
                    Some(index) => EdgeMetadata::PropertyIndex { property: child.property, index },
                    None => EdgeMetadata::Property { property: child.property },
                };
                graph.add_edge(
                    registry,
                    pseudo,
                    Edge { from: child.node, to: id, kind: EdgeKind::DataFlow, metadata },
                )?;
            }
        }
    }

    Ok(())
}

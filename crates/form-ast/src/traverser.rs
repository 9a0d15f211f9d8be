//! The structural traverser: a reusable visitor that owns tree shape so every
//! higher-level pass (metadata computation, dependency wiring diagnostics,
//! debug dumps) is a visitor object rather than a hand-rolled recursion.

use crate::ids::NodeId;
use crate::registry::NodeRegistry;

/// A positional step in a traversal path: a property name, optionally
/// qualified by an index when the property holds an ordered collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub property: &'static str,
    pub index: Option<usize>,
}

/// What a visitor should do after entering a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    SkipChildren,
    Stop,
}

/// The traversal context passed to each visitor callback.
#[derive(Debug, Clone)]
pub struct TraversalContext {
    /// Positional path from the traversal root, alternating property keys and
    /// numeric indices — e.g. `steps[0].blocks[2].validate[0]`.
    pub path: Vec<PathSegment>,
    pub parent: Option<NodeId>,
}

pub trait Visitor {
    fn enter_node(&mut self, node: NodeId, context: &TraversalContext) -> VisitControl;
    fn exit_node(&mut self, _node: NodeId, _context: &TraversalContext) {}
}

/// Walk `root`'s subtree in `registry`, invoking `visitor` for every reachable
/// node in child-property order. Returns early on [`VisitControl::Stop`].
pub fn walk(registry: &NodeRegistry, root: NodeId, visitor: &mut dyn Visitor) {
    walk_inner(registry, root, None, Vec::new(), visitor);
}

fn walk_inner(
    registry: &NodeRegistry,
    node: NodeId,
    parent: Option<NodeId>,
    path: Vec<PathSegment>,
    visitor: &mut dyn Visitor,
) -> VisitControl {
    let context = TraversalContext { path: path.clone(), parent };
    match visitor.enter_node(node, &context) {
        VisitControl::Stop => return VisitControl::Stop,
        VisitControl::SkipChildren => {
            visitor.exit_node(node, &context);
            return VisitControl::Continue;
        }
        VisitControl::Continue => {}
    }

    for child in registry.children_of(node) {
        let mut child_path = path.clone();
        child_path.push(PathSegment { property: child.property, index: child.index });
        if walk_inner(registry, child.node, Some(node), child_path, visitor) == VisitControl::Stop {
            return VisitControl::Stop;
        }
    }

    visitor.exit_node(node, &context);
    VisitControl::Continue
}

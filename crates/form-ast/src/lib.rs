//! Compiles an authored journey document into a typed AST, a stable node
//! registry, and the data-flow dependency graph between nodes.

pub mod compiler;
pub mod error;
pub mod graph;
pub mod ids;
pub mod node;
pub mod pseudo;
pub mod registry;
pub mod schema;
pub mod traverser;
pub mod value;

pub use compiler::{clone_runtime_subtree, compile, extend_with_runtime, mark_step_scope, CompileOutput, RuntimeCompileState};
pub use error::{CompileError, SchemaIssue};
pub use graph::{DependencyGraph, Edge, EdgeKind, EdgeMetadata, WiringError};
pub use ids::{IdGenerator, NodeCategory, NodeId};
pub use node::{
    AccessNode, AccessOutcome, ActionNode, AstNode, AstNodeKind, BlockKind, BlockNode,
    ConditionalNode, EffectsAndNext, FormatNode, FunctionKind, FunctionNode, IterateMode,
    IterateNode, JourneyNode, LogicalOp, LogicalPredicateNode, NextNode, NotPredicateNode,
    PipelineNode, ReferenceNode, StepNode, SubmitNode, TaggedChild, TestPredicateNode,
    ValidationNode,
};
pub use pseudo::{PseudoKey, PseudoNode, PseudoNodeType};
pub use registry::{MetadataRegistry, NodeMetadata, NodeRegistry, PseudoRegistry, RegistryError};
pub use traverser::{PathSegment, TraversalContext, VisitControl, Visitor};
pub use value::{Literal, ValueOrNode};

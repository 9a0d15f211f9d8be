//! AST node kinds: structure, expression, predicate, and transition nodes.
//!
//! Every authored subtree produces a fresh node with a fresh [`NodeId`] — the
//! compiler performs no structural sharing, so the dependency graph stays a
//! plain DAG without reference counting.

use crate::ids::NodeId;
use crate::value::{Literal, ValueOrNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Field,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Condition,
    Transformer,
    Effect,
    Generator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterateMode {
    Map,
    Filter,
    Find,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

/// A child reference carried on an [`AstNode`], tagged with the
/// property (and, for ordered collections, index) it was attached under. This
/// is exactly the unit the wiring pass (`graph.rs`) and the structural
/// traverser (`traverser.rs`) both iterate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedChild {
    pub property: &'static str,
    pub index: Option<usize>,
    pub node: NodeId,
}

impl TaggedChild {
    pub fn new(property: &'static str, node: NodeId) -> Self {
        Self { property, index: None, node }
    }

    pub fn indexed(property: &'static str, index: usize, node: NodeId) -> Self {
        Self { property, index: Some(index), node }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JourneyNode {
    pub code: String,
    pub title: String,
    pub path_prefix: String,
    pub on_access: Vec<NodeId>,
    pub data: Option<Literal>,
    pub steps: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepNode {
    pub path: String,
    pub title: String,
    pub blocks: Vec<NodeId>,
    pub on_access: Vec<NodeId>,
    pub on_action: Vec<NodeId>,
    pub on_submission: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub variant: String,
    pub kind: BlockKind,
    /// Field blocks only.
    pub code: Option<String>,
    pub default_value: Option<ValueOrNode>,
    pub format_pipeline: Option<NodeId>,
    pub validate: Vec<NodeId>,
    pub dependent: Option<NodeId>,
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceNode {
    /// `[refType, key, ...rest]`. `refType` is one of `answers | data | query
    /// | params | post` when it participates in pseudo-node wiring; any other
    /// value still evaluates (walked against an empty base) but produces no
    /// dependency edge.
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatNode {
    pub template: String,
    pub arguments: Vec<ValueOrNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub input: ValueOrNode,
    pub transformers: Vec<ValueOrNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub name: String,
    pub function_type: FunctionKind,
    pub arguments: Vec<ValueOrNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalNode {
    pub predicate: NodeId,
    pub then_value: ValueOrNode,
    pub else_value: ValueOrNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationNode {
    pub condition: NodeId,
    pub message: ValueOrNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterateNode {
    pub input: ValueOrNode,
    pub mode: IterateMode,
    /// MAP: the per-item yield template.
    pub yield_template: Option<ValueOrNode>,
    /// FILTER / FIND: the per-item predicate.
    pub predicate: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextNode {
    pub when: Option<NodeId>,
    pub goto: ValueOrNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestPredicateNode {
    pub subject: ValueOrNode,
    pub condition: NodeId,
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotPredicateNode {
    pub operand: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPredicateNode {
    pub op: LogicalOp,
    pub operands: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Redirect { when: Option<NodeId>, goto: ValueOrNode },
    Error { when: Option<NodeId>, status: ValueOrNode, message: ValueOrNode },
}

impl AccessOutcome {
    pub fn when(&self) -> Option<NodeId> {
        match self {
            AccessOutcome::Redirect { when, .. } => *when,
            AccessOutcome::Error { when, .. } => *when,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessNode {
    pub when: Option<NodeId>,
    pub effects: Vec<NodeId>,
    pub next: Vec<AccessOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub when: Option<NodeId>,
    pub name: String,
    pub effects: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectsAndNext {
    pub effects: Vec<NodeId>,
    pub next: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitNode {
    pub when: Option<NodeId>,
    pub validate: bool,
    pub on_valid: EffectsAndNext,
    pub on_invalid: EffectsAndNext,
    pub on_always: Vec<NodeId>,
}

/// The payload of a single AST node, tagged by the category the spec assigns
/// it: structure, expression, predicate, or transition.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNodeKind {
    // Structure
    Journey(JourneyNode),
    Step(StepNode),
    Block(BlockNode),
    // Expression
    Reference(ReferenceNode),
    Format(FormatNode),
    Pipeline(PipelineNode),
    Function(FunctionNode),
    Conditional(ConditionalNode),
    Validation(ValidationNode),
    Iterate(IterateNode),
    Next(NextNode),
    // Predicate
    Test(TestPredicateNode),
    Not(NotPredicateNode),
    Logical(LogicalPredicateNode),
    // Transition
    Access(AccessNode),
    Action(ActionNode),
    Submit(SubmitNode),
}

impl AstNodeKind {
    pub fn discriminator(&self) -> &'static str {
        match self {
            AstNodeKind::Journey(_) => "Journey",
            AstNodeKind::Step(_) => "Step",
            AstNodeKind::Block(_) => "Block",
            AstNodeKind::Reference(_) => "Reference",
            AstNodeKind::Format(_) => "Format",
            AstNodeKind::Pipeline(_) => "Pipeline",
            AstNodeKind::Function(_) => "Function",
            AstNodeKind::Conditional(_) => "Conditional",
            AstNodeKind::Validation(_) => "Validation",
            AstNodeKind::Iterate(_) => "Iterate",
            AstNodeKind::Next(_) => "Next",
            AstNodeKind::Test(_) => "Test",
            AstNodeKind::Not(_) => "Not",
            AstNodeKind::Logical(LogicalPredicateNode { op: LogicalOp::And, .. }) => "And",
            AstNodeKind::Logical(LogicalPredicateNode { op: LogicalOp::Or, .. }) => "Or",
            AstNodeKind::Logical(LogicalPredicateNode { op: LogicalOp::Xor, .. }) => "Xor",
            AstNodeKind::Access(_) => "Access",
            AstNodeKind::Action(_) => "Action",
            AstNodeKind::Submit(_) => "Submit",
        }
    }

    pub fn is_structure(&self) -> bool {
        matches!(self, AstNodeKind::Journey(_) | AstNodeKind::Step(_) | AstNodeKind::Block(_))
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, AstNodeKind::Access(_) | AstNodeKind::Action(_) | AstNodeKind::Submit(_))
    }

    pub fn is_predicate(&self) -> bool {
        matches!(self, AstNodeKind::Test(_) | AstNodeKind::Not(_) | AstNodeKind::Logical(_))
    }

    pub fn is_expression(&self) -> bool {
        !self.is_structure() && !self.is_transition() && !self.is_predicate()
    }

    /// Every child this node attaches, tagged with the property (and
    /// positional index, where ordering is observable) it hangs off. This is
    /// the single source of truth both the dependency-graph wiring pass and
    /// the structural traverser walk against.
    pub fn children(&self) -> Vec<TaggedChild> {
        let mut out = Vec::new();
        let value_or_node = |property, v: &ValueOrNode, out: &mut Vec<TaggedChild>| {
            if let Some(id) = v.as_node() {
                out.push(TaggedChild::new(property, id));
            }
        };
        let indexed_list = |property: &'static str, items: &[NodeId], out: &mut Vec<TaggedChild>| {
            for (i, id) in items.iter().enumerate() {
                out.push(TaggedChild::indexed(property, i, *id));
            }
        };
        let indexed_voln_list = |property: &'static str, items: &[ValueOrNode], out: &mut Vec<TaggedChild>| {
            for (i, v) in items.iter().enumerate() {
                if let Some(id) = v.as_node() {
                    out.push(TaggedChild::indexed(property, i, id));
                }
            }
        };

        match self {
            AstNodeKind::Journey(j) => {
                indexed_list("onAccess", &j.on_access, &mut out);
                indexed_list("steps", &j.steps, &mut out);
                indexed_list("children", &j.children, &mut out);
            }
            AstNodeKind::Step(s) => {
                indexed_list("blocks", &s.blocks, &mut out);
                indexed_list("onAccess", &s.on_access, &mut out);
                indexed_list("onAction", &s.on_action, &mut out);
                indexed_list("onSubmission", &s.on_submission, &mut out);
            }
            AstNodeKind::Block(b) => {
                if let Some(dv) = &b.default_value {
                    value_or_node("defaultValue", dv, &mut out);
                }
                if let Some(fp) = b.format_pipeline {
                    out.push(TaggedChild::new("formatPipeline", fp));
                }
                indexed_list("validate", &b.validate, &mut out);
                if let Some(dep) = b.dependent {
                    out.push(TaggedChild::new("dependent", dep));
                }
            }
            AstNodeKind::Reference(_) => {}
            AstNodeKind::Format(f) => indexed_voln_list("arguments", &f.arguments, &mut out),
            AstNodeKind::Pipeline(p) => {
                value_or_node("input", &p.input, &mut out);
                indexed_voln_list("transformers", &p.transformers, &mut out);
            }
            AstNodeKind::Function(f) => indexed_voln_list("arguments", &f.arguments, &mut out),
            AstNodeKind::Conditional(c) => {
                out.push(TaggedChild::new("predicate", c.predicate));
                value_or_node("then", &c.then_value, &mut out);
                value_or_node("else", &c.else_value, &mut out);
            }
            AstNodeKind::Validation(v) => {
                out.push(TaggedChild::new("condition", v.condition));
                value_or_node("message", &v.message, &mut out);
            }
            AstNodeKind::Iterate(it) => {
                value_or_node("input", &it.input, &mut out);
                if let Some(y) = &it.yield_template {
                    value_or_node("yield", y, &mut out);
                }
                if let Some(p) = it.predicate {
                    out.push(TaggedChild::new("predicate", p));
                }
            }
            AstNodeKind::Next(n) => {
                if let Some(w) = n.when {
                    out.push(TaggedChild::new("when", w));
                }
                value_or_node("goto", &n.goto, &mut out);
            }
            AstNodeKind::Test(t) => {
                value_or_node("subject", &t.subject, &mut out);
                out.push(TaggedChild::new("condition", t.condition));
            }
            AstNodeKind::Not(n) => out.push(TaggedChild::new("operand", n.operand)),
            AstNodeKind::Logical(l) => indexed_list("operands", &l.operands, &mut out),
            AstNodeKind::Access(a) => {
                if let Some(w) = a.when {
                    out.push(TaggedChild::new("when", w));
                }
                indexed_list("effects", &a.effects, &mut out);
                for (i, outcome) in a.next.iter().enumerate() {
                    if let Some(w) = outcome.when() {
                        out.push(TaggedChild::indexed("next.when", i, w));
                    }
                    match outcome {
                        AccessOutcome::Redirect { goto, .. } => {
                            if let Some(id) = goto.as_node() {
                                out.push(TaggedChild::indexed("next.goto", i, id));
                            }
                        }
                        AccessOutcome::Error { status, message, .. } => {
                            if let Some(id) = status.as_node() {
                                out.push(TaggedChild::indexed("next.status", i, id));
                            }
                            if let Some(id) = message.as_node() {
                                out.push(TaggedChild::indexed("next.message", i, id));
                            }
                        }
                    }
                }
            }
            AstNodeKind::Action(a) => {
                if let Some(w) = a.when {
                    out.push(TaggedChild::new("when", w));
                }
                indexed_list("effects", &a.effects, &mut out);
            }
            AstNodeKind::Submit(s) => {
                if let Some(w) = s.when {
                    out.push(TaggedChild::new("when", w));
                }
                indexed_list("onValid.effects", &s.on_valid.effects, &mut out);
                if let Some(n) = s.on_valid.next {
                    out.push(TaggedChild::new("onValid.next", n));
                }
                indexed_list("onInvalid.effects", &s.on_invalid.effects, &mut out);
                if let Some(n) = s.on_invalid.next {
                    out.push(TaggedChild::new("onInvalid.next", n));
                }
                indexed_list("onAlways.effects", &s.on_always, &mut out);
            }
        }
        out
    }
}

/// A registered AST node: a stable ID plus its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub id: NodeId,
    pub kind: AstNodeKind,
}

impl AstNode {
    pub fn new(id: NodeId, kind: AstNodeKind) -> Self {
        Self { id, kind }
    }
}

//! JSON → AST compilation: the depth-first walk that turns an authored
//! journey document into a registered, wired, typed AST.

use crate::error::CompileError;
use crate::graph::{self, DependencyGraph};
use crate::ids::{IdGenerator, NodeCategory, NodeId};
use crate::node::{
    AccessNode, AccessOutcome, ActionNode, AstNode, AstNodeKind, BlockKind, BlockNode,
    ConditionalNode, EffectsAndNext, FormatNode, FunctionKind, FunctionNode, IterateMode,
    IterateNode, JourneyNode, LogicalOp, LogicalPredicateNode, NextNode, NotPredicateNode,
    PipelineNode, ReferenceNode, StepNode, SubmitNode, TestPredicateNode, ValidationNode,
};
use crate::pseudo::{PseudoKey, PseudoNodeType};
use crate::registry::{MetadataRegistry, NodeRegistry};
use crate::schema;
use crate::traverser::{self, TraversalContext, VisitControl, Visitor};
use crate::value::{Literal, ValueOrNode};
use serde_json::Value;
use tracing::debug;

/// Everything a completed compilation produces: the frozen registries plus
/// the ID generator a runtime extension seeds itself from.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub root: NodeId,
    pub registry: NodeRegistry,
    pub pseudo: crate::registry::PseudoRegistry,
    pub metadata: MetadataRegistry,
    pub graph: DependencyGraph,
    pub ids: IdGenerator,
}

struct CompileCtx {
    ids: IdGenerator,
    registry: NodeRegistry,
    pseudo: crate::registry::PseudoRegistry,
    metadata: MetadataRegistry,
    category: NodeCategory,
    pseudo_category: NodeCategory,
}

impl CompileCtx {
    fn insert(&mut self, kind: AstNodeKind, parent: NodeId, property: &'static str, index: Option<usize>) -> NodeId {
        let id = self.ids.next_id(self.category);
        self.registry.insert(AstNode::new(id, kind)).expect("freshly minted id is unique");
        let meta = self.metadata.entry(id);
        meta.attached_to_parent_node = Some(parent);
        meta.attached_to_parent_property = Some((property.to_string(), index));
        id
    }

    fn pseudo_key(&mut self, pseudo_type: PseudoNodeType, key: &str) -> NodeId {
        let category = self.pseudo_category;
        let ids = &mut self.ids;
        self.pseudo.get_or_insert_with(PseudoKey::new(pseudo_type, key), || ids.next_id(category))
    }
}

/// Compile a full journey document into a wired AST.
pub fn compile(journey: &Value) -> Result<CompileOutput, CompileError> {
    let mut issues = Vec::new();
    if let Err(e) = schema::validate_serializable(journey) {
        issues.extend(e);
    }
    if let Err(e) = schema::validate_journey_shape(journey) {
        issues.extend(e);
    }
    if !issues.is_empty() {
        return Err(CompileError::SchemaViolation(issues));
    }

    let mut ctx = CompileCtx {
        ids: IdGenerator::new(),
        registry: NodeRegistry::new(),
        pseudo: crate::registry::PseudoRegistry::new(),
        metadata: MetadataRegistry::new(),
        category: NodeCategory::CompileAst,
        pseudo_category: NodeCategory::CompilePseudo,
    };

    let root = compile_journey_root(&mut ctx, journey)?;
    let graph = graph::wire(&ctx.registry, &ctx.pseudo)?;
    debug!(nodes = ctx.registry.len(), pseudo = ctx.pseudo.len(), edges = graph.edges().len(), "compiled journey");

    Ok(CompileOutput {
        root,
        registry: ctx.registry,
        pseudo: ctx.pseudo,
        metadata: ctx.metadata,
        graph,
        ids: ctx.ids,
    })
}

fn compile_journey_root(ctx: &mut CompileCtx, value: &Value) -> Result<NodeId, CompileError> {
    let id = ctx.ids.next_id(ctx.category);
    let kind = compile_journey_body(ctx, value, id)?;
    ctx.registry.insert(AstNode::new(id, kind)).expect("freshly minted id is unique");
    Ok(id)
}

fn compile_journey_body(ctx: &mut CompileCtx, value: &Value, self_id: NodeId) -> Result<AstNodeKind, CompileError> {
    let code = str_field(value, "code").unwrap_or_default().to_string();
    let title = str_field(value, "title").unwrap_or_default().to_string();
    let path_prefix = str_field(value, "pathPrefix").unwrap_or_default().to_string();
    let data = value.get("data").map(Literal::from_json);

    let mut on_access = Vec::new();
    for (i, item) in arr_field(value, "onAccess").iter().enumerate() {
        on_access.push(compile_access(ctx, item, self_id, "onAccess", Some(i))?);
    }

    let mut steps = Vec::new();
    for (i, item) in arr_field(value, "steps").iter().enumerate() {
        steps.push(compile_step(ctx, item, self_id, i)?);
    }

    let mut children = Vec::new();
    for (i, item) in arr_field(value, "children").iter().enumerate() {
        let child_id = ctx.ids.next_id(ctx.category);
        let child_kind = compile_journey_body(ctx, item, child_id)?;
        ctx.registry.insert(AstNode::new(child_id, child_kind)).expect("freshly minted id is unique");
        let meta = ctx.metadata.entry(child_id);
        meta.attached_to_parent_node = Some(self_id);
        meta.attached_to_parent_property = Some(("children".to_string(), Some(i)));
        children.push(child_id);
    }

    Ok(AstNodeKind::Journey(JourneyNode { code, title, path_prefix, on_access, data, steps, children }))
}

fn compile_step(ctx: &mut CompileCtx, value: &Value, parent: NodeId, index: usize) -> Result<NodeId, CompileError> {
    let id = ctx.ids.next_id(ctx.category);
    let path = str_field(value, "path").unwrap_or_default().to_string();
    let title = str_field(value, "title").unwrap_or_default().to_string();

    let mut blocks = Vec::new();
    for (i, item) in arr_field(value, "blocks").iter().enumerate() {
        blocks.push(compile_block(ctx, item, id, i)?);
    }
    let mut on_access = Vec::new();
    for (i, item) in arr_field(value, "onAccess").iter().enumerate() {
        on_access.push(compile_access(ctx, item, id, "onAccess", Some(i))?);
    }
    let mut on_action = Vec::new();
    for (i, item) in arr_field(value, "onAction").iter().enumerate() {
        on_action.push(compile_action(ctx, item, id, "onAction", Some(i))?);
    }
    let mut on_submission = Vec::new();
    for (i, item) in arr_field(value, "onSubmission").iter().enumerate() {
        on_submission.push(compile_submit(ctx, item, id, "onSubmission", Some(i))?);
    }

    ctx.registry
        .insert(AstNode::new(id, AstNodeKind::Step(StepNode { path, title, blocks, on_access, on_action, on_submission })))
        .expect("freshly minted id is unique");
    let meta = ctx.metadata.entry(id);
    meta.attached_to_parent_node = Some(parent);
    meta.attached_to_parent_property = Some(("steps".to_string(), Some(index)));
    Ok(id)
}

fn compile_block(ctx: &mut CompileCtx, value: &Value, parent: NodeId, index: usize) -> Result<NodeId, CompileError> {
    let id = ctx.ids.next_id(ctx.category);
    let variant = str_field(value, "variant").unwrap_or_default().to_string();
    let kind = match str_field(value, "blockType") {
        Some("basic") => BlockKind::Basic,
        _ => BlockKind::Field,
    };
    let code = str_field(value, "code").map(String::from);
    let multiple = value.get("multiple").and_then(Value::as_bool).unwrap_or(false);

    let default_value = match value.get("defaultValue") {
        Some(v) => Some(compile_value_or_node(ctx, v, id, "defaultValue", None)?),
        None => None,
    };
    let format_pipeline = match value.get("formatPipeline") {
        Some(v) => Some(compile_expr_node(ctx, v, id, "formatPipeline", None)?),
        None => None,
    };
    let mut validate = Vec::new();
    for (i, item) in arr_field(value, "validate").iter().enumerate() {
        validate.push(compile_expr_node(ctx, item, id, "validate", Some(i))?);
    }
    let dependent = match value.get("dependent") {
        Some(v) => Some(compile_expr_node(ctx, v, id, "dependent", None)?),
        None => None,
    };

    ctx.registry
        .insert(AstNode::new(
            id,
            AstNodeKind::Block(BlockNode { variant, kind, code, default_value, format_pipeline, validate, dependent, multiple }),
        ))
        .expect("freshly minted id is unique");
    let meta = ctx.metadata.entry(id);
    meta.attached_to_parent_node = Some(parent);
    meta.attached_to_parent_property = Some(("blocks".to_string(), Some(index)));
    Ok(id)
}

/// Compile a value that may be either an inline literal or a nested
/// expression node, per the `ValueOrNode` union.
fn compile_value_or_node(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<ValueOrNode, CompileError> {
    if is_expression_object(value) {
        Ok(ValueOrNode::Node(compile_expr_node(ctx, value, parent, property, index)?))
    } else {
        Ok(ValueOrNode::Literal(Literal::from_json(value)))
    }
}

fn is_expression_object(value: &Value) -> bool {
    matches!(
        value.get("type").and_then(Value::as_str),
        Some("Reference" | "Format" | "Pipeline" | "Function" | "Conditional" | "Validation" | "Iterate" | "Next")
    )
}

fn compile_expr_node(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    let discriminator = value.get("type").and_then(Value::as_str);
    let kind = match discriminator {
        Some("Reference") => {
            let path: Vec<String> = arr_field(value, "path").iter().filter_map(Value::as_str).map(String::from).collect();
            if path.len() >= 2 {
                if let Some(pseudo_type) = PseudoNodeType::from_reference_type(&path[0]) {
                    ctx.pseudo_key(pseudo_type, &path[1]);
                }
            }
            AstNodeKind::Reference(ReferenceNode { path })
        }
        Some("Format") => {
            let template = str_field(value, "template").unwrap_or_default().to_string();
            let id = ctx.ids.next_id(ctx.category);
            let mut arguments = Vec::new();
            for (i, arg) in arr_field(value, "arguments").iter().enumerate() {
                arguments.push(compile_value_or_node(ctx, arg, id, "arguments", Some(i))?);
            }
            return finish(ctx, id, parent, property, index, AstNodeKind::Format(FormatNode { template, arguments }));
        }
        Some("Pipeline") => {
            let id = ctx.ids.next_id(ctx.category);
            let input = compile_value_or_node(ctx, field(value, "input"), id, "input", None)?;
            let mut transformers = Vec::new();
            for (i, t) in arr_field(value, "transformers").iter().enumerate() {
                transformers.push(compile_value_or_node(ctx, t, id, "transformers", Some(i))?);
            }
            return finish(ctx, id, parent, property, index, AstNodeKind::Pipeline(PipelineNode { input, transformers }));
        }
        Some("Function") => {
            let id = ctx.ids.next_id(ctx.category);
            let name = str_field(value, "name").unwrap_or_default().to_string();
            let function_type = match str_field(value, "FunctionType") {
                Some("Transformer") => FunctionKind::Transformer,
                Some("Effect") => FunctionKind::Effect,
                Some("Generator") => FunctionKind::Generator,
                _ => FunctionKind::Condition,
            };
            let mut arguments = Vec::new();
            for (i, a) in arr_field(value, "arguments").iter().enumerate() {
                arguments.push(compile_value_or_node(ctx, a, id, "arguments", Some(i))?);
            }
            return finish(ctx, id, parent, property, index, AstNodeKind::Function(FunctionNode { name, function_type, arguments }));
        }
        Some("Conditional") => {
            let id = ctx.ids.next_id(ctx.category);
            let predicate = compile_predicate(ctx, field(value, "predicate"), id, "predicate", None)?;
            let then_value = compile_value_or_node(ctx, field(value, "then"), id, "then", None)?;
            let else_value = compile_value_or_node(ctx, field(value, "else"), id, "else", None)?;
            return finish(ctx, id, parent, property, index, AstNodeKind::Conditional(ConditionalNode { predicate, then_value, else_value }));
        }
        Some("Validation") => {
            let id = ctx.ids.next_id(ctx.category);
            let condition = compile_predicate(ctx, field(value, "condition"), id, "condition", None)?;
            let message = compile_value_or_node(ctx, field(value, "message"), id, "message", None)?;
            return finish(ctx, id, parent, property, index, AstNodeKind::Validation(ValidationNode { condition, message }));
        }
        Some("Iterate") => {
            let id = ctx.ids.next_id(ctx.category);
            let input = compile_value_or_node(ctx, field(value, "input"), id, "input", None)?;
            let mode = match str_field(value, "mode") {
                Some("filter") => IterateMode::Filter,
                Some("find") => IterateMode::Find,
                _ => IterateMode::Map,
            };
            let yield_template = match value.get("yield") {
                Some(v) => Some(compile_value_or_node(ctx, v, id, "yield", None)?),
                None => None,
            };
            let predicate = match value.get("predicate") {
                Some(v) => Some(compile_predicate(ctx, v, id, "predicate", None)?),
                None => None,
            };
            return finish(ctx, id, parent, property, index, AstNodeKind::Iterate(IterateNode { input, mode, yield_template, predicate }));
        }
        Some("Next") => {
            let id = ctx.ids.next_id(ctx.category);
            let when = match value.get("when") {
                Some(v) => Some(compile_predicate(ctx, v, id, "when", None)?),
                None => None,
            };
            let goto = compile_value_or_node(ctx, field(value, "goto"), id, "goto", None)?;
            return finish(ctx, id, parent, property, index, AstNodeKind::Next(NextNode { when, goto }));
        }
        _ => return Err(CompileError::UnknownDiscriminator { path: format!("{property}{}", index_suffix(index)) }),
    };
    Ok(ctx.insert(kind, parent, property, index))
}

fn finish(
    ctx: &mut CompileCtx,
    id: NodeId,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
    kind: AstNodeKind,
) -> Result<NodeId, CompileError> {
    ctx.registry.insert(AstNode::new(id, kind)).expect("freshly minted id is unique");
    let meta = ctx.metadata.entry(id);
    meta.attached_to_parent_node = Some(parent);
    meta.attached_to_parent_property = Some((property.to_string(), index));
    Ok(id)
}

/// Predicates are keyed by a flat `LogicType` discriminator (`'Test' | 'Not'
/// | 'And' | 'Or' | 'Xor'`), distinct from the `type` key expression nodes use.
fn compile_predicate(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    let discriminator = str_field(value, "LogicType");
    let id = ctx.ids.next_id(ctx.category);
    let kind = match discriminator {
        Some("Test") => {
            let subject = compile_value_or_node(ctx, field(value, "subject"), id, "subject", None)?;
            let condition = compile_expr_node(ctx, field(value, "condition"), id, "condition", None)?;
            let negate = value.get("negate").and_then(Value::as_bool).unwrap_or(false);
            AstNodeKind::Test(TestPredicateNode { subject, condition, negate })
        }
        Some("Not") => {
            let operand = compile_predicate(ctx, field(value, "operand"), id, "operand", None)?;
            AstNodeKind::Not(NotPredicateNode { operand })
        }
        Some(op @ ("And" | "Or" | "Xor")) => {
            let op = match op {
                "Or" => LogicalOp::Or,
                "Xor" => LogicalOp::Xor,
                _ => LogicalOp::And,
            };
            let mut operands = Vec::new();
            for (i, o) in arr_field(value, "operands").iter().enumerate() {
                operands.push(compile_predicate(ctx, o, id, "operands", Some(i))?);
            }
            AstNodeKind::Logical(LogicalPredicateNode { op, operands })
        }
        _ => return Err(CompileError::UnknownDiscriminator { path: format!("{property}{}", index_suffix(index)) }),
    };
    finish(ctx, id, parent, property, index, kind)
}

/// Validates the flat `TransitionType` discriminator (`'Access' | 'Action' |
/// 'Submit'`) transition nodes carry; dispatch to `compile_access`/
/// `compile_action`/`compile_submit` itself stays positional (by which
/// array a node was read from), but the field must agree with that position.
fn expect_transition_type(
    value: &Value,
    expected: &'static str,
    property: &'static str,
    index: Option<usize>,
) -> Result<(), CompileError> {
    match str_field(value, "TransitionType") {
        Some(t) if t == expected => Ok(()),
        _ => Err(CompileError::UnknownDiscriminator { path: format!("{property}{}", index_suffix(index)) }),
    }
}

fn compile_access(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    expect_transition_type(value, "Access", property, index)?;
    let id = ctx.ids.next_id(ctx.category);
    let when = match value.get("when") {
        Some(v) => Some(compile_predicate(ctx, v, id, "when", None)?),
        None => None,
    };
    let mut effects = Vec::new();
    for (i, e) in arr_field(value, "effects").iter().enumerate() {
        effects.push(compile_expr_node(ctx, e, id, "effects", Some(i))?);
    }
    let mut next = Vec::new();
    for (i, n) in arr_field(value, "next").iter().enumerate() {
        let outcome_when = match n.get("when") {
            Some(w) => Some(compile_predicate(ctx, w, id, "next.when", Some(i))?),
            None => None,
        };
        let outcome = if n.get("goto").is_some() {
            let goto = compile_value_or_node(ctx, field(n, "goto"), id, "next.goto", Some(i))?;
            AccessOutcome::Redirect { when: outcome_when, goto }
        } else {
            let status = compile_value_or_node(ctx, field(n, "status"), id, "next.status", Some(i))?;
            let message = compile_value_or_node(ctx, field(n, "message"), id, "next.message", Some(i))?;
            AccessOutcome::Error { when: outcome_when, status, message }
        };
        next.push(outcome);
    }
    finish(ctx, id, parent, property, index, AstNodeKind::Access(AccessNode { when, effects, next }))
}

fn compile_action(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    expect_transition_type(value, "Action", property, index)?;
    let id = ctx.ids.next_id(ctx.category);
    let when = match value.get("when") {
        Some(v) => Some(compile_predicate(ctx, v, id, "when", None)?),
        None => None,
    };
    let name = str_field(value, "name").unwrap_or_default().to_string();
    let mut effects = Vec::new();
    for (i, e) in arr_field(value, "effects").iter().enumerate() {
        effects.push(compile_expr_node(ctx, e, id, "effects", Some(i))?);
    }
    finish(ctx, id, parent, property, index, AstNodeKind::Action(ActionNode { when, name, effects }))
}

fn compile_submit(
    ctx: &mut CompileCtx,
    value: &Value,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    expect_transition_type(value, "Submit", property, index)?;
    let id = ctx.ids.next_id(ctx.category);
    let when = match value.get("when") {
        Some(v) => Some(compile_predicate(ctx, v, id, "when", None)?),
        None => None,
    };
    let validate = value.get("validate").and_then(Value::as_bool).unwrap_or(true);
    let on_valid = compile_effects_and_next(ctx, value.get("onValid"), id, "onValid")?;
    let on_invalid = compile_effects_and_next(ctx, value.get("onInvalid"), id, "onInvalid")?;
    let mut on_always = Vec::new();
    for (i, e) in arr_field(value, "onAlways").iter().enumerate() {
        on_always.push(compile_expr_node(ctx, e, id, "onAlways.effects", Some(i))?);
    }
    finish(ctx, id, parent, property, index, AstNodeKind::Submit(SubmitNode { when, validate, on_valid, on_invalid, on_always }))
}

fn compile_effects_and_next(
    ctx: &mut CompileCtx,
    value: Option<&Value>,
    parent: NodeId,
    property: &'static str,
) -> Result<EffectsAndNext, CompileError> {
    let Some(value) = value else { return Ok(EffectsAndNext::default()) };
    let mut effects = Vec::new();
    for (i, e) in arr_field(value, "effects").iter().enumerate() {
        effects.push(compile_expr_node(ctx, e, parent, property, Some(i))?);
    }
    let next = match value.get("next") {
        Some(n) => Some(compile_expr_node(ctx, n, parent, property, None)?),
        None => None,
    };
    Ok(EffectsAndNext { effects, next })
}

/// Populate `is_current_step` / `is_ancestor_of_step` / `is_descendant_of_step`
/// for a single target step, relative to the whole journey.
pub fn mark_step_scope(registry: &NodeRegistry, metadata: &mut MetadataRegistry, target_step: NodeId) {
    for ancestor in metadata.ancestor_chain(target_step) {
        if ancestor == target_step {
            metadata.entry(ancestor).is_current_step = true;
        } else {
            metadata.entry(ancestor).is_ancestor_of_step = true;
        }
    }

    struct DescendantMarker<'a> {
        metadata: &'a mut MetadataRegistry,
        root: NodeId,
    }
    impl Visitor for DescendantMarker<'_> {
        fn enter_node(&mut self, node: NodeId, _ctx: &TraversalContext) -> VisitControl {
            if node != self.root {
                self.metadata.entry(node).is_descendant_of_step = true;
            }
            VisitControl::Continue
        }
    }
    let mut marker = DescendantMarker { metadata, root: target_step };
    traverser::walk(registry, target_step, &mut marker);
}

/// The mutable, per-request overlay of the four frozen compile-time
/// structures. A request starts one of these (seeded from a [`CompileOutput`])
/// and keeps extending the same instance across however many
/// [`extend_with_runtime`] calls the request's iterations need, so runtime IDs
/// minted for the third `ITERATE` never collide with the first.
#[derive(Debug, Clone)]
pub struct RuntimeCompileState {
    pub ids: IdGenerator,
    pub registry: NodeRegistry,
    pub pseudo: crate::registry::PseudoRegistry,
    pub metadata: MetadataRegistry,
    pub graph: DependencyGraph,
}

impl RuntimeCompileState {
    pub fn from_compiled(base: &CompileOutput) -> Self {
        Self {
            ids: IdGenerator::for_runtime_extension(&base.ids),
            registry: base.registry.extend_for_request(),
            pseudo: base.pseudo.extend_for_request(),
            metadata: base.metadata.extend_for_request(),
            graph: base.graph.extend_for_request(),
        }
    }
}

/// Compile `subtrees` as runtime nodes extending `state` in place, wiring each
/// freshly minted node as it's inserted. Used by the thunk engine's `ITERATE`
/// handler to materialize one expression subtree per item and by composite-block
/// expansion.
pub fn extend_with_runtime(
    state: &mut RuntimeCompileState,
    parent: NodeId,
    property: &'static str,
    subtrees: &[Value],
) -> Result<Vec<NodeId>, CompileError> {
    let mut ctx = CompileCtx {
        ids: std::mem::take(&mut state.ids),
        registry: std::mem::take(&mut state.registry),
        pseudo: std::mem::take(&mut state.pseudo),
        metadata: std::mem::take(&mut state.metadata),
        category: NodeCategory::RuntimeAst,
        pseudo_category: NodeCategory::RuntimePseudo,
    };

    let mut new_roots = Vec::new();
    let result = (|| {
        for (i, subtree) in subtrees.iter().enumerate() {
            new_roots.push(compile_value_or_node(&mut ctx, subtree, parent, property, Some(i))?.as_node().unwrap_or(parent));
        }
        Ok(())
    })();

    state.ids = ctx.ids;
    state.registry = ctx.registry;
    state.pseudo = ctx.pseudo;
    state.metadata = ctx.metadata;
    result?;

    for &root in &new_roots {
        for id in reachable_new_nodes(&state.registry, root) {
            graph::wire_node(&state.registry, &state.pseudo, id, &mut state.graph)?;
        }
    }

    Ok(new_roots)
}

/// Deep-clone `source` (an expression or predicate subtree, typically an
/// ITERATE node's `yield` template or `predicate`) into fresh runtime nodes
/// under `state`, wiring the clone as it's inserted. Every descendant gets
/// its own minted `NodeId`, so distinct items evaluated under distinct scope
/// frames never alias the same memoized result. `Reference` leaves keep
/// their original path unchanged — they name an external answer/data slot,
/// not per-item state, so the existing pseudo wiring is reused as-is.
pub fn clone_runtime_subtree(
    state: &mut RuntimeCompileState,
    source: NodeId,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    let mut ctx = CompileCtx {
        ids: std::mem::take(&mut state.ids),
        registry: std::mem::take(&mut state.registry),
        pseudo: std::mem::take(&mut state.pseudo),
        metadata: std::mem::take(&mut state.metadata),
        category: NodeCategory::RuntimeAst,
        pseudo_category: NodeCategory::RuntimePseudo,
    };

    let result = clone_node(&mut ctx, source, parent, property, index);

    state.ids = ctx.ids;
    state.registry = ctx.registry;
    state.pseudo = ctx.pseudo;
    state.metadata = ctx.metadata;
    let root = result?;

    for id in reachable_new_nodes(&state.registry, root) {
        graph::wire_node(&state.registry, &state.pseudo, id, &mut state.graph)?;
    }

    Ok(root)
}

/// Recursively clones a single node's payload, minting a fresh id for it and
/// for every `NodeId`/`ValueOrNode` child it carries. Structure and
/// transition kinds can never legitimately appear inside an expression or
/// predicate subtree, so hitting one here means the source id was wrong.
fn clone_node(
    ctx: &mut CompileCtx,
    source: NodeId,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<NodeId, CompileError> {
    let Some(source_kind) = ctx.registry.get(source).map(|n| n.kind.clone()) else {
        return Err(CompileError::UnknownDiscriminator { path: format!("{property}{}", index_suffix(index)) });
    };
    let id = ctx.ids.next_id(ctx.category);
    let kind = match source_kind {
        AstNodeKind::Reference(r) => AstNodeKind::Reference(r),
        AstNodeKind::Format(f) => {
            let mut arguments = Vec::new();
            for (i, a) in f.arguments.iter().enumerate() {
                arguments.push(clone_voln(ctx, a, id, "arguments", Some(i))?);
            }
            AstNodeKind::Format(FormatNode { template: f.template, arguments })
        }
        AstNodeKind::Pipeline(p) => {
            let input = clone_voln(ctx, &p.input, id, "input", None)?;
            let mut transformers = Vec::new();
            for (i, t) in p.transformers.iter().enumerate() {
                transformers.push(clone_voln(ctx, t, id, "transformers", Some(i))?);
            }
            AstNodeKind::Pipeline(PipelineNode { input, transformers })
        }
        AstNodeKind::Function(f) => {
            let mut arguments = Vec::new();
            for (i, a) in f.arguments.iter().enumerate() {
                arguments.push(clone_voln(ctx, a, id, "arguments", Some(i))?);
            }
            AstNodeKind::Function(FunctionNode { name: f.name, function_type: f.function_type, arguments })
        }
        AstNodeKind::Conditional(c) => {
            let predicate = clone_node(ctx, c.predicate, id, "predicate", None)?;
            let then_value = clone_voln(ctx, &c.then_value, id, "then", None)?;
            let else_value = clone_voln(ctx, &c.else_value, id, "else", None)?;
            AstNodeKind::Conditional(ConditionalNode { predicate, then_value, else_value })
        }
        AstNodeKind::Validation(v) => {
            let condition = clone_node(ctx, v.condition, id, "condition", None)?;
            let message = clone_voln(ctx, &v.message, id, "message", None)?;
            AstNodeKind::Validation(ValidationNode { condition, message })
        }
        AstNodeKind::Iterate(it) => {
            let input = clone_voln(ctx, &it.input, id, "input", None)?;
            let yield_template = match &it.yield_template {
                Some(y) => Some(clone_voln(ctx, y, id, "yield", None)?),
                None => None,
            };
            let predicate = match it.predicate {
                Some(p) => Some(clone_node(ctx, p, id, "predicate", None)?),
                None => None,
            };
            AstNodeKind::Iterate(IterateNode { input, mode: it.mode, yield_template, predicate })
        }
        AstNodeKind::Next(n) => {
            let when = match n.when {
                Some(w) => Some(clone_node(ctx, w, id, "when", None)?),
                None => None,
            };
            let goto = clone_voln(ctx, &n.goto, id, "goto", None)?;
            AstNodeKind::Next(NextNode { when, goto })
        }
        AstNodeKind::Test(t) => {
            let subject = clone_voln(ctx, &t.subject, id, "subject", None)?;
            let condition = clone_node(ctx, t.condition, id, "condition", None)?;
            AstNodeKind::Test(TestPredicateNode { subject, condition, negate: t.negate })
        }
        AstNodeKind::Not(n) => {
            let operand = clone_node(ctx, n.operand, id, "operand", None)?;
            AstNodeKind::Not(NotPredicateNode { operand })
        }
        AstNodeKind::Logical(l) => {
            let mut operands = Vec::new();
            for (i, o) in l.operands.iter().enumerate() {
                operands.push(clone_node(ctx, *o, id, "operands", Some(i))?);
            }
            AstNodeKind::Logical(LogicalPredicateNode { op: l.op, operands })
        }
        AstNodeKind::Journey(_)
        | AstNodeKind::Step(_)
        | AstNodeKind::Block(_)
        | AstNodeKind::Access(_)
        | AstNodeKind::Action(_)
        | AstNodeKind::Submit(_) => {
            return Err(CompileError::UnknownDiscriminator { path: format!("{property}{}", index_suffix(index)) });
        }
    };
    finish(ctx, id, parent, property, index, kind)
}

fn clone_voln(
    ctx: &mut CompileCtx,
    value: &ValueOrNode,
    parent: NodeId,
    property: &'static str,
    index: Option<usize>,
) -> Result<ValueOrNode, CompileError> {
    match value {
        ValueOrNode::Literal(lit) => Ok(ValueOrNode::Literal(lit.clone())),
        ValueOrNode::Node(source) => Ok(ValueOrNode::Node(clone_node(ctx, *source, parent, property, index)?)),
    }
}

fn reachable_new_nodes(registry: &NodeRegistry, root: NodeId) -> Vec<NodeId> {
    struct Collector(Vec<NodeId>);
    impl Visitor for Collector {
        fn enter_node(&mut self, node: NodeId, _ctx: &TraversalContext) -> VisitControl {
            self.0.push(node);
            VisitControl::Continue
        }
    }
    let mut collector = Collector(Vec::new());
    traverser::walk(registry, root, &mut collector);
    collector.0
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn arr_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    value.get(key).unwrap_or(&NULL)
}

fn index_suffix(index: Option<usize>) -> String {
    match index {
        Some(i) => format!("[{i}]"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_a_minimal_journey_with_one_field_block() {
        let doc = json!({
            "type": "journey",
            "code": "apply",
            "title": "Apply",
            "steps": [{
                "type": "step",
                "path": "/start",
                "title": "Start",
                "blocks": [{
                    "type": "block",
                    "variant": "text",
                    "blockType": "field",
                    "code": "firstName",
                    "defaultValue": { "type": "Reference", "path": ["answers", "firstName"] },
                }],
            }],
        });

        let output = compile(&doc).expect("compiles");
        assert!(output.registry.len() >= 3);
        assert_eq!(output.pseudo.len(), 1);
        assert_eq!(output.graph.edges().len(), 1);
    }

    #[test]
    fn rejects_malformed_journeys_with_aggregated_issues() {
        let doc = json!({ "type": "journey" });
        let err = compile(&doc).unwrap_err();
        match err {
            CompileError::SchemaViolation(issues) => assert!(!issues.is_empty()),
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn step_scope_metadata_marks_ancestors_and_descendants() {
        let doc = json!({
            "type": "journey", "code": "apply", "title": "Apply",
            "steps": [{
                "type": "step", "path": "/start", "title": "Start",
                "blocks": [{ "type": "block", "variant": "text", "blockType": "field", "code": "x" }],
            }],
        });
        let mut output = compile(&doc).expect("compiles");
        let step_id = output.registry.ids().find(|id| {
            matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Step(_))
        }).unwrap();

        mark_step_scope(&output.registry, &mut output.metadata, step_id);

        assert!(output.metadata.get(step_id).unwrap().is_current_step);
        assert!(output.metadata.get(output.root).unwrap().is_ancestor_of_step);
        let block_id = output.registry.ids().find(|id| {
            matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Block(_))
        }).unwrap();
        assert!(output.metadata.get(block_id).unwrap().is_descendant_of_step);
    }

    #[test]
    fn extend_with_runtime_wires_the_new_subtree() {
        let doc = json!({
            "type": "journey", "code": "apply", "title": "Apply",
            "steps": [{
                "type": "step", "path": "/start", "title": "Start",
                "blocks": [{ "type": "block", "variant": "text", "blockType": "field", "code": "x" }],
            }],
        });
        let output = compile(&doc).expect("compiles");
        let block_id = output.registry.ids().find(|id| {
            matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Block(_))
        }).unwrap();

        let mut state = RuntimeCompileState::from_compiled(&output);
        let item_template = json!({ "type": "Reference", "path": ["answers", "firstName"] });
        let new_roots = extend_with_runtime(&mut state, block_id, "yield", std::slice::from_ref(&item_template)).unwrap();
        assert_eq!(new_roots.len(), 1);
        assert!(new_roots[0].is_runtime());
        assert_eq!(state.pseudo.len(), 1);
    }

    #[test]
    fn successive_runtime_extensions_never_collide_on_ids() {
        let doc = json!({
            "type": "journey", "code": "apply", "title": "Apply",
            "steps": [{
                "type": "step", "path": "/start", "title": "Start",
                "blocks": [{ "type": "block", "variant": "text", "blockType": "field", "code": "x" }],
            }],
        });
        let output = compile(&doc).expect("compiles");
        let block_id = output.registry.ids().find(|id| {
            matches!(output.registry.get(*id).unwrap().kind, AstNodeKind::Block(_))
        }).unwrap();

        let mut state = RuntimeCompileState::from_compiled(&output);
        let template = json!({ "type": "Reference", "path": ["answers", "firstName"] });
        let first = extend_with_runtime(&mut state, block_id, "yield", std::slice::from_ref(&template)).unwrap();
        let second = extend_with_runtime(&mut state, block_id, "yield", std::slice::from_ref(&template)).unwrap();
        assert_ne!(first[0], second[0]);
    }
}

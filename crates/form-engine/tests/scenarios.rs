//! End-to-end scenarios exercising the evaluator against small compiled
//! journeys: one request's worth of reference resolution, conditional
//! branching, pipelines, iteration, and the access/submit transitions.

use async_trait::async_trait;
use form_ast::NodeCategory;
use form_engine::{
    locate_and_mark_step, run_access, run_submit, ConditionFn, EffectContext, EffectFn,
    EvalError, EvaluationContext, ErrorKind, FunctionRegistries, RequestShell, TransformerFn,
    TransitionOutcome,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct IsPresent;
impl ConditionFn for IsPresent {
    fn call(&self, subject: &Value, _args: &[Value]) -> Result<bool, EvalError> {
        Ok(!subject.is_null())
    }
}

struct Uppercase;
impl TransformerFn for Uppercase {
    fn call(&self, value: &Value, _args: &[Value]) -> Result<Value, EvalError> {
        match value.as_str() {
            Some(s) => Ok(Value::from(s.to_uppercase())),
            None => Ok(value.clone()),
        }
    }
}

struct RecordFlag;
#[async_trait]
impl EffectFn for RecordFlag {
    async fn call(&self, ctx: &mut EffectContext<'_, '_>, _args: &[Value]) -> Result<Value, EvalError> {
        ctx.set_data(json!({ "flagged": true }));
        Ok(Value::Bool(true))
    }
}

fn registries() -> FunctionRegistries {
    let mut registries = FunctionRegistries::new();
    registries.register_condition("isPresent", Arc::new(IsPresent)).unwrap();
    registries.register_transformer("upper", Arc::new(Uppercase)).unwrap();
    registries.register_effect("recordFlag", Arc::new(RecordFlag)).unwrap();
    registries
}

#[tokio::test]
async fn reference_resolves_a_posted_answer() {
    let journey = json!({
        "type": "journey", "code": "onboarding", "title": "Onboarding",
        "steps": [{
            "type": "step", "path": "/name", "title": "Name",
            "blocks": [{
                "blockType": "field", "variant": "text", "code": "firstName",
            }],
        }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let request = RequestShell::new("/name").with_post(json!({ "firstName": "Ada" }));
    let mut ctx = EvaluationContext::new(&output, &functions, request);

    let value = form_engine::handlers::pseudo::resolve(&mut ctx, form_ast::PseudoNodeType::AnswerLocal, "firstName")
        .await
        .unwrap();
    assert_eq!(value, Value::from("Ada"));
}

#[tokio::test]
async fn conditional_with_falsy_predicate_takes_the_else_branch() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let predicate_id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let predicate = form_ast::AstNodeKind::Test(form_ast::TestPredicateNode {
        subject: form_ast::ValueOrNode::Literal(form_ast::Literal::Null),
        condition: insert_condition(&mut ctx, "isPresent"),
        negate: false,
    });
    ctx.state.registry.insert(form_ast::AstNode::new(predicate_id, predicate)).unwrap();

    let conditional_id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let conditional = form_ast::AstNodeKind::Conditional(form_ast::ConditionalNode {
        predicate: predicate_id,
        then_value: form_ast::ValueOrNode::Literal(form_ast::Literal::String("yes".into())),
        else_value: form_ast::ValueOrNode::Literal(form_ast::Literal::String("no".into())),
    });
    ctx.state.registry.insert(form_ast::AstNode::new(conditional_id, conditional)).unwrap();

    let result = form_engine::invoke(&mut ctx, conditional_id).await.unwrap();
    assert_eq!(result, Value::from("no"));
}

#[tokio::test]
async fn pipeline_applies_transformers_in_order() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let function_id = insert_transformer(&mut ctx, "upper");
    let pipeline_id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let pipeline = form_ast::AstNodeKind::Pipeline(form_ast::PipelineNode {
        input: form_ast::ValueOrNode::Literal(form_ast::Literal::String("ada".into())),
        transformers: vec![form_ast::ValueOrNode::Node(function_id)],
    });
    ctx.state.registry.insert(form_ast::AstNode::new(pipeline_id, pipeline)).unwrap();

    let result = form_engine::invoke(&mut ctx, pipeline_id).await.unwrap();
    assert_eq!(result, Value::from("ADA"));
}

#[tokio::test]
async fn iterate_map_over_object_yields_key_value_pairs() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let it = form_ast::IterateNode {
        input: form_ast::ValueOrNode::Literal(form_ast::Literal::from_json(&json!({ "a": 1, "b": 2 }))),
        mode: form_ast::IterateMode::Map,
        yield_template: None,
        predicate: None,
    };
    let node_id = NodeCategory::RuntimeAst;
    let result = form_engine::handlers::iterate::eval(&mut ctx, form_ast::NodeId::new(node_id, 999), &it).await.unwrap();
    let Value::Array(items) = result else { panic!("expected array") };
    assert_eq!(items.len(), 2);
    for item in &items {
        assert!(item.get("@key").is_some());
    }
}

#[tokio::test]
async fn access_with_matching_error_outcome_denies_the_request() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{
            "type": "step", "path": "/locked", "title": "Locked",
            "blocks": [],
            "onAccess": [{
                "TransitionType": "Access",
                "next": [{ "status": 403, "message": "forbidden" }],
            }],
        }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/locked"));
    let step = locate_and_mark_step(&mut ctx, "/locked").unwrap();

    let outcome = run_access(&mut ctx, step).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Error { status: Value::from(403.0), message: Value::from("forbidden") });
}

#[tokio::test]
async fn submit_with_no_validation_failures_takes_the_valid_branch() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{
            "type": "step", "path": "/s", "title": "S",
            "blocks": [],
            "onSubmission": [{
                "TransitionType": "Submit",
                "validate": true,
                "onValid": { "next": { "type": "Next", "goto": "/done" } },
                "onInvalid": { "next": { "type": "Next", "goto": "/s" } },
            }],
        }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));
    let step = locate_and_mark_step(&mut ctx, "/s").unwrap();

    let outcome = run_submit(&mut ctx, step).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Goto(Value::from("/done")));
}

#[tokio::test]
async fn empty_array_iterate_find_is_undefined() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let it = form_ast::IterateNode {
        input: form_ast::ValueOrNode::Literal(form_ast::Literal::Array(vec![])),
        mode: form_ast::IterateMode::Find,
        yield_template: None,
        predicate: None,
    };
    let result = form_engine::handlers::iterate::eval(&mut ctx, form_ast::NodeId::new(NodeCategory::RuntimeAst, 1), &it).await.unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn xor_truth_table_is_true_only_for_a_single_truthy_operand() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let a = insert_bool(&mut ctx, true);
    let b = insert_bool(&mut ctx, true);
    let c = insert_bool(&mut ctx, false);

    let all_truthy = form_ast::AstNodeKind::Logical(form_ast::LogicalPredicateNode {
        op: form_ast::LogicalOp::Xor,
        operands: vec![a, b],
    });
    let id1 = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    ctx.state.registry.insert(form_ast::AstNode::new(id1, all_truthy)).unwrap();
    let result = form_engine::invoke(&mut ctx, id1).await.unwrap();
    assert_eq!(result, Value::Bool(false));

    let one_truthy = form_ast::AstNodeKind::Logical(form_ast::LogicalPredicateNode {
        op: form_ast::LogicalOp::Xor,
        operands: vec![a, c],
    });
    let id2 = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    ctx.state.registry.insert(form_ast::AstNode::new(id2, one_truthy)).unwrap();
    let result = form_engine::invoke(&mut ctx, id2).await.unwrap();
    assert_eq!(result, Value::Bool(true));
}

#[tokio::test]
async fn reference_with_a_short_path_returns_the_whole_namespace_as_null() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let reference_id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let reference = form_ast::AstNodeKind::Reference(form_ast::ReferenceNode { path: vec!["answers".into()] });
    ctx.state.registry.insert(form_ast::AstNode::new(reference_id, reference)).unwrap();

    let result = form_engine::invoke(&mut ctx, reference_id).await.unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn safe_property_access_rejects_prototype_pollution_keys() {
    let journey = json!({
        "type": "journey", "code": "j", "title": "J",
        "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
    });
    let output = form_ast::compile(&journey).unwrap();
    let functions = registries();
    let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

    let reference_id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let reference = form_ast::AstNodeKind::Reference(form_ast::ReferenceNode {
        path: vec!["data".into(), "payload".into(), "__proto__".into()],
    });
    ctx.state.registry.insert(form_ast::AstNode::new(reference_id, reference)).unwrap();

    let data_pseudo_id = ctx.state.ids.next_id(NodeCategory::RuntimePseudo);
    ctx.state.pseudo.get_or_insert_with(form_ast::PseudoKey::new(form_ast::PseudoNodeType::Data, "payload"), || data_pseudo_id);
    ctx.data = json!({ "payload": { "safe": 1 } });

    let err = form_engine::invoke(&mut ctx, reference_id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SecurityViolation);
}

fn insert_condition(ctx: &mut EvaluationContext<'_>, name: &str) -> form_ast::NodeId {
    let id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let kind = form_ast::AstNodeKind::Function(form_ast::FunctionNode {
        name: name.to_string(),
        function_type: form_ast::FunctionKind::Condition,
        arguments: vec![],
    });
    ctx.state.registry.insert(form_ast::AstNode::new(id, kind)).unwrap();
    id
}

fn insert_transformer(ctx: &mut EvaluationContext<'_>, name: &str) -> form_ast::NodeId {
    let id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let kind = form_ast::AstNodeKind::Function(form_ast::FunctionNode {
        name: name.to_string(),
        function_type: form_ast::FunctionKind::Transformer,
        arguments: vec![],
    });
    ctx.state.registry.insert(form_ast::AstNode::new(id, kind)).unwrap();
    id
}

fn insert_bool(ctx: &mut EvaluationContext<'_>, value: bool) -> form_ast::NodeId {
    let id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
    let kind = form_ast::AstNodeKind::Pipeline(form_ast::PipelineNode {
        input: form_ast::ValueOrNode::Literal(form_ast::Literal::Bool(value)),
        transformers: vec![],
    });
    ctx.state.registry.insert(form_ast::AstNode::new(id, kind)).unwrap();
    id
}

use crate::answers::MutationSource;
use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvalError};
use crate::handlers::UNSAFE_KEYS;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use form_ast::{AstNodeKind, BlockKind, NodeId, PseudoNodeType, ValueOrNode};
use serde_json::Value;

/// Mints (or reuses) the pseudo node for `(pseudo_type, code)` and evaluates
/// it. Reference nodes reach pseudo nodes the compiler already wired during
/// compilation; callers that need a pseudo value the compiler never wired —
/// chiefly `AnswerLocal`, which has no authored reference syntax of its own —
/// go through this instead.
pub async fn resolve(ctx: &mut EvaluationContext<'_>, pseudo_type: PseudoNodeType, code: &str) -> EvalResult {
    let key = form_ast::PseudoKey::new(pseudo_type, code.to_string());
    let id = if let Some(existing) = ctx.state.pseudo.lookup(&key) {
        existing
    } else {
        let fresh = ctx.state.ids.next_id(form_ast::NodeCategory::RuntimePseudo);
        ctx.state.pseudo.get_or_insert_with(key, || fresh)
    };
    invoke(ctx, id).await
}

/// Dispatches on the pseudo node's type. `Query`/`Params`/`Post` read the
/// matching request object by key; `Data` is a single-key lookup on the
/// request's data bag (no property-path traversal); `Answer` reads the
/// current stored value; `AnswerLocal` runs the per-field fill-order chain.
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId) -> EvalResult {
    let Some(pseudo) = ctx.state.pseudo.get(node).cloned() else {
        return Err(EvalError::at(ErrorKind::LookupFailed, node, "pseudo node is not registered"));
    };
    let key = pseudo.key.key.clone();
    if UNSAFE_KEYS.contains(&key.as_str()) {
        return Err(EvalError::at(ErrorKind::TypeMismatch, node, format!("key '{key}' is not accessible")));
    }

    match pseudo.key.pseudo_type {
        PseudoNodeType::Query => Ok(ctx.request.source(PseudoNodeType::Query, &key)),
        PseudoNodeType::Params => Ok(ctx.request.source(PseudoNodeType::Params, &key)),
        PseudoNodeType::Post => Ok(ctx.request.source(PseudoNodeType::Post, &key)),
        PseudoNodeType::Data => Ok(ctx.data.get(&key).cloned().unwrap_or(Value::Null)),
        PseudoNodeType::Answer => Ok(ctx.answers.current(&key)),
        PseudoNodeType::AnswerLocal => eval_answer_local(ctx, node, &key).await,
    }
}

/// The five-step fill-order chain for a field's resolved value this request:
/// an action-set value wins outright; otherwise try the field's format
/// pipeline, then the raw POST value, then the field's default, then a
/// value loaded from prior persisted state; otherwise `undefined`. Each
/// step's own evaluation error is treated as "not present" and falls
/// through rather than propagating.
async fn eval_answer_local(ctx: &mut EvaluationContext<'_>, node: NodeId, code: &str) -> EvalResult {
    if ctx.answers.has_mutation_from(code, MutationSource::Action) {
        return Ok(ctx.answers.current(code));
    }

    let facts = find_field_block(ctx, code);

    if let Some(pipeline) = facts.as_ref().and_then(|f| f.format_pipeline) {
        if let Ok(value) = invoke(ctx, pipeline).await {
            if !value.is_null() {
                ctx.answers.record(code, value.clone(), MutationSource::Processed);
                return Ok(value);
            }
        }
    }

    let post_key = form_ast::PseudoKey::new(PseudoNodeType::Post, code.to_string());
    if let Some(post_id) = ctx.state.pseudo.lookup(&post_key) {
        if let Ok(value) = invoke(ctx, post_id).await {
            if !value.is_null() {
                ctx.answers.record(code, value.clone(), MutationSource::Post);
                return Ok(value);
            }
        }
    } else {
        let fallback = ctx.request.source(PseudoNodeType::Post, code);
        if !fallback.is_null() {
            ctx.answers.record(code, fallback.clone(), MutationSource::Post);
            return Ok(fallback);
        }
    }

    if let Some(default_value) = facts.as_ref().and_then(|f| f.default_value.clone()) {
        if let Ok(value) = eval_voln(ctx, &default_value).await {
            if !value.is_null() {
                ctx.answers.record(code, value.clone(), MutationSource::Default);
                return Ok(value);
            }
        }
    }

    if ctx.answers.has_mutation_from(code, MutationSource::Load) {
        return Ok(ctx.answers.current(code));
    }

    let _ = node;
    Ok(Value::Null)
}

struct FieldBlockFacts {
    format_pipeline: Option<NodeId>,
    default_value: Option<ValueOrNode>,
}

/// Locates the field block matching `code` within the current step's scope,
/// returning just the facts `eval_answer_local` needs as an owned value so no
/// borrow of the registry survives across the subsequent `.await` points.
fn find_field_block(ctx: &EvaluationContext<'_>, code: &str) -> Option<FieldBlockFacts> {
    for id in ctx.state.registry.ids() {
        let in_step_scope = ctx
            .state
            .metadata
            .get(id)
            .map(|m| m.is_current_step || m.is_descendant_of_step)
            .unwrap_or(false);
        if !in_step_scope {
            continue;
        }
        if let Some(ast) = ctx.state.registry.get(id) {
            if let AstNodeKind::Block(b) = &ast.kind {
                if b.kind == BlockKind::Field && b.code.as_deref() == Some(code) {
                    return Some(FieldBlockFacts {
                        format_pipeline: b.format_pipeline,
                        default_value: b.default_value.clone(),
                    });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registries::FunctionRegistries;
    use crate::request::RequestShell;

    fn sample_context() -> form_ast::CompileOutput {
        form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn post_pseudo_reads_the_post_body() {
        let output = sample_context();
        let functions = FunctionRegistries::new();
        let request = RequestShell::new("/s").with_post(serde_json::json!({ "firstName": "Alice" }));
        let mut ctx = EvaluationContext::new(&output, &functions, request);

        let id = ctx.state.ids.next_id(form_ast::NodeCategory::RuntimePseudo);
        let key = form_ast::PseudoKey::new(PseudoNodeType::Post, "firstName");
        ctx.state.pseudo.get_or_insert_with(key, || id);

        let result = eval(&mut ctx, id).await.unwrap();
        assert_eq!(result, Value::from("Alice"));
    }

    #[tokio::test]
    async fn unsafe_key_is_rejected() {
        let output = sample_context();
        let functions = FunctionRegistries::new();
        let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));

        let id = ctx.state.ids.next_id(form_ast::NodeCategory::RuntimePseudo);
        let key = form_ast::PseudoKey::new(PseudoNodeType::Data, "__proto__");
        ctx.state.pseudo.get_or_insert_with(key, || id);

        let err = eval(&mut ctx, id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn answer_local_falls_back_to_post_when_no_processing_or_default() {
        let output = sample_context();
        let functions = FunctionRegistries::new();
        let request = RequestShell::new("/s").with_post(serde_json::json!({ "lastName": "Stone" }));
        let mut ctx = EvaluationContext::new(&output, &functions, request);

        let post_id = ctx.state.ids.next_id(form_ast::NodeCategory::RuntimePseudo);
        ctx.state.pseudo.get_or_insert_with(form_ast::PseudoKey::new(PseudoNodeType::Post, "lastName"), || post_id);

        let local_id = ctx.state.ids.next_id(form_ast::NodeCategory::RuntimePseudo);
        ctx.state.pseudo.get_or_insert_with(form_ast::PseudoKey::new(PseudoNodeType::AnswerLocal, "lastName"), || local_id);

        let result = eval(&mut ctx, local_id).await.unwrap();
        assert_eq!(result, Value::from("Stone"));
        assert_eq!(ctx.answers.current("lastName"), Value::from("Stone"));
    }
}

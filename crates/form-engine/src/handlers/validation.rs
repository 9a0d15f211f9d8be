use crate::context::EvaluationContext;
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use form_ast::{AstNodeKind, BlockKind, NodeId, ValidationNode};
use serde_json::Value;

/// Evaluates `condition`; if truthy, records a validation failure against
/// the nearest enclosing field block. An erroring condition is treated as
/// falsy (no failure recorded).
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId, v: &ValidationNode) -> EvalResult {
    let truthy = match invoke(ctx, v.condition).await {
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    };
    if truthy {
        let message = eval_voln(ctx, &v.message).await.unwrap_or(Value::Null);
        ctx.record_validation_failure(nearest_field(ctx, node), message);
    }
    Ok(Value::Bool(truthy))
}

fn nearest_field(ctx: &EvaluationContext<'_>, node: NodeId) -> NodeId {
    for ancestor in ctx.state.metadata.ancestor_chain(node) {
        if let Some(ast) = ctx.state.registry.get(ancestor) {
            if let AstNodeKind::Block(b) = &ast.kind {
                if b.kind == BlockKind::Field && b.code.is_some() {
                    return ancestor;
                }
            }
        }
    }
    node
}

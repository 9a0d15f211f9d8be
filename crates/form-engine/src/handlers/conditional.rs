use crate::context::EvaluationContext;
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use form_ast::{ConditionalNode, NodeId};
use serde_json::Value;

/// Evaluates `predicate` (errors become falsy), then evaluates `then` or
/// `else` accordingly. Literal branches are returned as-is.
pub async fn eval(ctx: &mut EvaluationContext<'_>, _node: NodeId, c: &ConditionalNode) -> EvalResult {
    let predicate = match invoke(ctx, c.predicate).await {
        Ok(v) => v,
        Err(_) => return Ok(Value::Null),
    };
    if is_truthy(&predicate) {
        eval_voln(ctx, &c.then_value).await
    } else {
        eval_voln(ctx, &c.else_value).await
    }
}

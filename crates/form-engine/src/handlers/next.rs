use crate::context::EvaluationContext;
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use form_ast::{NextNode, NodeId};
use serde_json::Value;

/// Evaluates optional `when`; if falsy or erroring, returns `undefined`.
/// Otherwise evaluates `goto` and returns the navigation target.
pub async fn eval(ctx: &mut EvaluationContext<'_>, _node: NodeId, n: &NextNode) -> EvalResult {
    if let Some(when) = n.when {
        let truthy = match invoke(ctx, when).await {
            Ok(v) => is_truthy(&v),
            Err(_) => false,
        };
        if !truthy {
            return Ok(Value::Null);
        }
    }
    eval_voln(ctx, &n.goto).await
}

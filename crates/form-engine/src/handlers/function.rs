use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::invoker::eval_voln;
use crate::memo::EvalResult;
use form_ast::{FunctionKind, FunctionNode, NodeId, ValueOrNode};
use serde_json::Value;

pub async fn evaluate_arguments(ctx: &mut EvaluationContext<'_>, arguments: &[ValueOrNode]) -> Result<Vec<Value>, EvalError> {
    let mut out = Vec::with_capacity(arguments.len());
    for arg in arguments {
        out.push(eval_voln(ctx, arg).await?);
    }
    Ok(out)
}

/// Dispatch a named function with an explicit leading subject value — used
/// by PREDICATE TEST (`condition(subject, ...args)`) and PIPELINE
/// (`transformer(previousValue, ...args)`) where the subject is supplied by
/// the caller rather than part of the function node's own `arguments`.
pub async fn call_with_subject(ctx: &mut EvaluationContext<'_>, node: NodeId, f: &FunctionNode, subject: Value) -> EvalResult {
    let args = evaluate_arguments(ctx, &f.arguments).await?;
    let result = match f.function_type {
        FunctionKind::Condition => ctx.functions.call_condition(&f.name, &subject, &args).map(Value::Bool),
        FunctionKind::Transformer => ctx.functions.call_transformer(&f.name, &subject, &args),
        FunctionKind::Effect => {
            let functions = ctx.functions;
            let mut effect_ctx = ctx.effect_context();
            functions.call_effect(&f.name, &mut effect_ctx, &args).await
        }
        FunctionKind::Generator => ctx.functions.call_generator(&f.name, &args).await,
    };
    result.map_err(|e| if e.node.is_some() { e } else { EvalError::at(e.kind, node, e.message) })
}

/// Generic FUNCTION node invocation reached through ordinary dispatch (e.g.
/// as a transition effect): no implicit subject, only the node's own
/// arguments.
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId, f: &FunctionNode) -> EvalResult {
    call_with_subject(ctx, node, f, Value::Null).await
}

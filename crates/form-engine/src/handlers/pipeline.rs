use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvalError};
use crate::handlers::function::call_with_subject;
use crate::invoker::eval_voln;
use crate::memo::EvalResult;
use form_ast::{AstNodeKind, NodeId, PipelineNode};

/// Evaluates `input`, then threads the running value through each
/// transformer in order as `transformer(previousValue, ...transformerArgs)`.
/// Stops with `TRANSFORMER_FAILED` at the first step that fails.
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId, pipeline: &PipelineNode) -> EvalResult {
    let mut value = eval_voln(ctx, &pipeline.input).await?;

    for transformer in &pipeline.transformers {
        let outcome = match transformer {
            form_ast::ValueOrNode::Literal(l) => Ok(l.to_json()),
            form_ast::ValueOrNode::Node(id) => {
                let Some(AstNodeKind::Function(f)) = ctx.state.registry.get(*id).map(|n| n.kind.clone()) else {
                    return Err(EvalError::at(ErrorKind::EvaluationFailed, node, "pipeline transformer is not a function node"));
                };
                call_with_subject(ctx, *id, &f, value.clone()).await
            }
        };
        value = outcome.map_err(|e| EvalError::at(ErrorKind::TransformerFailed, e.node.unwrap_or(node), e.message))?;
    }

    Ok(value)
}

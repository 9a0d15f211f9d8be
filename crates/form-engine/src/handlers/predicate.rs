use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvalError};
use crate::handlers::function::call_with_subject;
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::memo::EvalResult;
use form_ast::{AstNodeKind, LogicalOp, LogicalPredicateNode, NodeId, NotPredicateNode, TestPredicateNode};
use serde_json::Value;

/// Evaluates `subject` then `condition` (a FUNCTION node of kind CONDITION)
/// as `condition(subjectValue, ...args)`. Returns `Boolean(result) XOR negate`.
pub async fn eval_test(ctx: &mut EvaluationContext<'_>, node: NodeId, t: &TestPredicateNode) -> EvalResult {
    let subject = eval_voln(ctx, &t.subject).await?;
    let Some(AstNodeKind::Function(f)) = ctx.state.registry.get(t.condition).map(|n| n.kind.clone()) else {
        return Err(EvalError::at(ErrorKind::EvaluationFailed, node, "TEST condition is not a function node"));
    };
    let result = call_with_subject(ctx, t.condition, &f, subject).await?;
    Ok(Value::Bool(is_truthy(&result) ^ t.negate))
}

/// Evaluates `operand` and returns its logical negation; an erroring operand
/// yields `undefined`.
pub async fn eval_not(ctx: &mut EvaluationContext<'_>, _node: NodeId, n: &NotPredicateNode) -> EvalResult {
    match invoke(ctx, n.operand).await {
        Ok(v) => Ok(Value::Bool(!is_truthy(&v))),
        Err(_) => Ok(Value::Null),
    }
}

/// AND/OR short-circuit left to right; XOR evaluates every operand (no
/// short-circuit) and is true iff exactly one is truthy. An erroring operand
/// is treated as falsy in every mode.
pub async fn eval_logical(ctx: &mut EvaluationContext<'_>, _node: NodeId, l: &LogicalPredicateNode) -> EvalResult {
    match l.op {
        LogicalOp::And => {
            for &operand in &l.operands {
                if !operand_truthy(ctx, operand).await {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        LogicalOp::Or => {
            for &operand in &l.operands {
                if operand_truthy(ctx, operand).await {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        LogicalOp::Xor => {
            let mut truthy_count = 0;
            for &operand in &l.operands {
                if operand_truthy(ctx, operand).await {
                    truthy_count += 1;
                }
            }
            Ok(Value::Bool(truthy_count == 1))
        }
    }
}

async fn operand_truthy(ctx: &mut EvaluationContext<'_>, operand: NodeId) -> bool {
    match invoke(ctx, operand).await {
        Ok(v) => is_truthy(&v),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_ast::{AstNode, Literal, NodeCategory, PipelineNode, ValueOrNode};

    fn sample_context() -> (form_ast::CompileOutput, crate::registries::FunctionRegistries) {
        let output = form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
        }))
        .unwrap();
        (output, crate::registries::FunctionRegistries::new())
    }

    /// A passthrough pipeline node standing in for a literal boolean operand
    /// (predicate operands must be real nodes, not inline literals).
    fn literal_bool_node(ctx: &mut EvaluationContext<'_>, value: bool) -> NodeId {
        let id = ctx.state.ids.next_id(NodeCategory::RuntimeAst);
        let kind = AstNodeKind::Pipeline(PipelineNode { input: ValueOrNode::Literal(Literal::Bool(value)), transformers: Vec::new() });
        ctx.state.registry.insert(AstNode::new(id, kind)).unwrap();
        id
    }

    #[tokio::test]
    async fn xor_is_true_for_exactly_one_truthy_operand() {
        let (output, functions) = sample_context();
        let mut ctx = EvaluationContext::new(&output, &functions, crate::request::RequestShell::new("/s"));

        let true_node = literal_bool_node(&mut ctx, true);
        let false_node = literal_bool_node(&mut ctx, false);

        let l = LogicalPredicateNode { op: LogicalOp::Xor, operands: vec![true_node, false_node] };
        let result = eval_logical(&mut ctx, NodeId::new(NodeCategory::RuntimeAst, 99), &l).await.unwrap();
        assert_eq!(result, Value::Bool(true));

        let l_both = LogicalPredicateNode { op: LogicalOp::Xor, operands: vec![true_node, true_node] };
        let result = eval_logical(&mut ctx, NodeId::new(NodeCategory::RuntimeAst, 99), &l_both).await.unwrap();
        assert_eq!(result, Value::Bool(false));
    }
}

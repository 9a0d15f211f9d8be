use crate::context::EvaluationContext;
use crate::error::{ErrorKind, EvalError};
use crate::handlers::safe_walk;
use crate::invoker::invoke;
use crate::memo::EvalResult;
use form_ast::{NodeId, PseudoKey, PseudoNodeType, ReferenceNode};
use serde_json::Value;

/// `path = [refType, key, ...rest]`. Invokes the pseudo node for
/// `(refType, key)`, then walks `rest` through the result via safe property
/// access. A path with fewer than two segments resolves to `undefined`
/// without error, matching the compiler's own no-edge rule for short paths.
pub async fn eval(ctx: &mut EvaluationContext<'_>, node: NodeId, reference: &ReferenceNode) -> EvalResult {
    let Some(ref_type) = reference.path.first() else {
        return Err(EvalError::at(ErrorKind::TypeMismatch, node, "reference path is empty"));
    };
    let Some(key) = reference.path.get(1) else {
        return Ok(Value::Null);
    };
    let Some(pseudo_type) = PseudoNodeType::from_reference_type(ref_type) else {
        return Err(EvalError::at(ErrorKind::TypeMismatch, node, format!("unknown reference type '{ref_type}'")));
    };

    let pseudo_key = PseudoKey::new(pseudo_type, key.clone());
    let Some(pseudo_id) = ctx.state.pseudo.lookup(&pseudo_key) else {
        return Err(EvalError::at(
            ErrorKind::LookupFailed,
            node,
            format!("no pseudo node registered for ({ref_type}, {key})"),
        ));
    };

    let base = invoke(ctx, pseudo_id).await?;
    safe_walk(&base, &reference.path[2..], node)
}

//! Node dispatch: `invoke` (suspendable) and `invoke_sync` (non-suspending,
//! gated on the `isAsync` propagation computed by [`EvaluationContext::is_async`]).

use crate::context::EvaluationContext;
use crate::error::{EngineError, ErrorKind, EvalError};
use crate::handlers;
use crate::memo::EvalResult;
use form_ast::{AstNodeKind, FunctionKind, NodeId, ValueOrNode};
use futures::future::BoxFuture;

/// Evaluate `node`, consulting and populating the memoization cache. Pseudo
/// nodes and handlers that mutate `answers` (effect functions) bypass the
/// cache so per-request ordering and provenance stay observable.
pub fn invoke<'a>(ctx: &'a mut EvaluationContext<'_>, node: NodeId) -> BoxFuture<'a, EvalResult> {
    Box::pin(async move {
        ctx.check_cancelled()?;

        if node.is_pseudo() {
            return handlers::pseudo::eval(ctx, node).await;
        }

        let Some(ast) = ctx.state.registry.get(node).cloned() else {
            return Err(EvalError::at(ErrorKind::LookupFailed, node, "node is not registered"));
        };

        let bypasses_cache = matches!(&ast.kind, AstNodeKind::Function(f) if f.function_type == FunctionKind::Effect);

        let scope_identity = ctx.scope.identity();
        if !bypasses_cache {
            if let Some(cached) = ctx.memo.get(node, &scope_identity) {
                return cached;
            }
        }

        let result: EvalResult = match &ast.kind {
            AstNodeKind::Reference(r) => handlers::reference::eval(ctx, node, r).await,
            AstNodeKind::Format(f) => handlers::format::eval(ctx, node, f).await,
            AstNodeKind::Pipeline(p) => handlers::pipeline::eval(ctx, node, p).await,
            AstNodeKind::Function(f) => handlers::function::eval(ctx, node, f).await,
            AstNodeKind::Conditional(c) => handlers::conditional::eval(ctx, node, c).await,
            AstNodeKind::Validation(v) => handlers::validation::eval(ctx, node, v).await,
            AstNodeKind::Iterate(it) => handlers::iterate::eval(ctx, node, it).await,
            AstNodeKind::Next(n) => handlers::next::eval(ctx, node, n).await,
            AstNodeKind::Test(t) => handlers::predicate::eval_test(ctx, node, t).await,
            AstNodeKind::Not(n) => handlers::predicate::eval_not(ctx, node, n).await,
            AstNodeKind::Logical(l) => handlers::predicate::eval_logical(ctx, node, l).await,
            AstNodeKind::Journey(_)
            | AstNodeKind::Step(_)
            | AstNodeKind::Block(_)
            | AstNodeKind::Access(_)
            | AstNodeKind::Action(_)
            | AstNodeKind::Submit(_) => {
                Err(EvalError::at(ErrorKind::EvaluationFailed, node, "not an expression node"))
            }
        };

        if !bypasses_cache {
            ctx.memo.insert(node, &scope_identity, result.clone());
        }
        result
    })
}

/// Evaluate a `ValueOrNode`: literals convert directly, nodes dispatch
/// through [`invoke`].
pub fn eval_voln<'a>(ctx: &'a mut EvaluationContext<'_>, value: &'a ValueOrNode) -> BoxFuture<'a, EvalResult> {
    Box::pin(async move {
        match value {
            ValueOrNode::Literal(l) => Ok(l.to_json()),
            ValueOrNode::Node(id) => invoke(ctx, *id).await,
        }
    })
}

/// Dispatch `node` without suspending. Fails with [`EngineError::Misuse`] if
/// `node` or any transitive child is async — calling this on an async-only
/// subgraph is a programmer error, not a handler-level result.
pub fn invoke_sync(ctx: &mut EvaluationContext<'_>, node: NodeId) -> Result<EvalResult, EngineError> {
    if ctx.is_async(node) {
        return Err(EngineError::Misuse(format!(
            "invokeSync called on node {node} whose subgraph requires async evaluation"
        )));
    }
    Ok(futures::executor::block_on(invoke(ctx, node)))
}

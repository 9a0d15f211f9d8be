//! The transition orchestrator: ACCESS (journey-level then step-level),
//! ACTION (on a matching POST), and SUBMIT, run in that fixed lifecycle
//! order by [`run_access`]/[`run_action`]/[`run_submit`].

use crate::context::EvaluationContext;
use crate::error::{EngineError, ErrorKind, EvalError};
use crate::handlers::is_truthy;
use crate::invoker::{eval_voln, invoke};
use crate::scope::{ScopeFrame, TransitionType};
use form_ast::{AstNodeKind, JourneyNode, NodeId, StepNode};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// No outcome fired; proceed as if nothing happened.
    Continue,
    /// Navigate to the given target.
    Goto(Value),
    /// Abort the request with a status and message.
    Error { status: Value, message: Value },
}

/// Runs the journey's `onAccess` effects top-down, then the target step's
/// own `onAccess`. Each level: evaluate `when` (skip the level entirely if
/// falsy), run effects in declared order under an `@transitionType: 'access'`
/// scope frame (the first effect failure aborts the whole request), then
/// evaluate `next` outcomes in order and apply the first one whose own `when`
/// is absent or truthy. A level with no match falls through to `Continue`.
pub async fn run_access(ctx: &mut EvaluationContext<'_>, step: NodeId) -> Result<TransitionOutcome, EngineError> {
    tracing::debug!(step = %step, "running access lifecycle");
    let Some(AstNodeKind::Journey(journey)) = ctx.state.registry.get(ctx.compiled.root).map(|n| n.kind.clone())
    else {
        return Err(EngineError::Misuse("journey root is not a Journey node".into()));
    };
    for &access_id in &journey.on_access {
        let outcome = run_access_node(ctx, access_id).await?;
        if outcome != TransitionOutcome::Continue {
            return Ok(outcome);
        }
    }

    let Some(AstNodeKind::Step(step_node)) = ctx.state.registry.get(step).map(|n| n.kind.clone()) else {
        return Err(EngineError::Misuse(format!("{step} is not a Step node")));
    };
    for &access_id in &step_node.on_access {
        let outcome = run_access_node(ctx, access_id).await?;
        if outcome != TransitionOutcome::Continue {
            return Ok(outcome);
        }
    }

    Ok(TransitionOutcome::Continue)
}

async fn run_access_node(ctx: &mut EvaluationContext<'_>, access_id: NodeId) -> Result<TransitionOutcome, EngineError> {
    let Some(AstNodeKind::Access(access)) = ctx.state.registry.get(access_id).map(|n| n.kind.clone()) else {
        return Err(EngineError::Misuse(format!("{access_id} is not an Access node")));
    };

    if let Some(when) = access.when {
        if !truthy_or_skip(ctx, when).await {
            return Ok(TransitionOutcome::Continue);
        }
    }

    ctx.scope.push(ScopeFrame::transition(TransitionType::Access));
    let effects_result = run_effects(ctx, &access.effects).await;
    ctx.scope.pop();
    effects_result?;

    for outcome in &access.next {
        let matches = match outcome.when() {
            Some(when) => truthy_or_skip(ctx, when).await,
            None => true,
        };
        if !matches {
            continue;
        }
        return Ok(match outcome {
            form_ast::AccessOutcome::Redirect { goto, .. } => TransitionOutcome::Goto(eval_voln(ctx, goto).await.unwrap_or(Value::Null)),
            form_ast::AccessOutcome::Error { status, message, .. } => TransitionOutcome::Error {
                status: eval_voln(ctx, status).await.unwrap_or(Value::Null),
                message: eval_voln(ctx, message).await.unwrap_or(Value::Null),
            },
        });
    }

    Ok(TransitionOutcome::Continue)
}

/// Runs the step's action matching `ctx.request.action_name`, if any. Only
/// the one action whose declared name matches fires; all others are
/// untouched. A mismatched or missing action name is not an error — it just
/// means no action transition applies this request.
pub async fn run_action(ctx: &mut EvaluationContext<'_>, step: NodeId) -> Result<TransitionOutcome, EngineError> {
    let Some(requested) = ctx.request.action_name.clone() else {
        return Ok(TransitionOutcome::Continue);
    };
    tracing::debug!(step = %step, action = %requested, "running action lifecycle");
    let Some(AstNodeKind::Step(step_node)) = ctx.state.registry.get(step).map(|n| n.kind.clone()) else {
        return Err(EngineError::Misuse(format!("{step} is not a Step node")));
    };

    for &action_id in &step_node.on_action {
        let Some(AstNodeKind::Action(action)) = ctx.state.registry.get(action_id).map(|n| n.kind.clone()) else {
            continue;
        };
        if action.name != requested {
            continue;
        }
        if let Some(when) = action.when {
            if !truthy_or_skip(ctx, when).await {
                return Ok(TransitionOutcome::Continue);
            }
        }
        ctx.scope.push(ScopeFrame::transition(TransitionType::Action));
        let result = run_effects(ctx, &action.effects).await;
        ctx.scope.pop();
        result?;
        return Ok(TransitionOutcome::Continue);
    }

    Ok(TransitionOutcome::Continue)
}

/// Evaluates `when`; if truthy, conditionally validates (clearing and
/// repopulating `ctx.validations` first), classifies valid iff no failure
/// was recorded, then runs `onAlways.effects` followed by the matching
/// `onValid`/`onInvalid` branch's effects and `next`.
pub async fn run_submit(ctx: &mut EvaluationContext<'_>, step: NodeId) -> Result<TransitionOutcome, EngineError> {
    tracing::debug!(step = %step, "running submit lifecycle");
    let Some(AstNodeKind::Step(step_node)) = ctx.state.registry.get(step).map(|n| n.kind.clone()) else {
        return Err(EngineError::Misuse(format!("{step} is not a Step node")));
    };

    for &submit_id in &step_node.on_submission {
        let Some(AstNodeKind::Submit(submit)) = ctx.state.registry.get(submit_id).map(|n| n.kind.clone()) else {
            continue;
        };
        if let Some(when) = submit.when {
            if !truthy_or_skip(ctx, when).await {
                continue;
            }
        }

        ctx.validations.clear();
        if submit.validate {
            run_all_validations(ctx, step).await?;
        }
        let valid = ctx.validations.is_empty();

        ctx.scope.push(ScopeFrame::transition(TransitionType::Submit));
        let outcome = run_submit_branch(ctx, &submit, valid).await;
        ctx.scope.pop();
        return outcome;
    }

    Ok(TransitionOutcome::Continue)
}

async fn run_submit_branch(
    ctx: &mut EvaluationContext<'_>,
    submit: &form_ast::SubmitNode,
    valid: bool,
) -> Result<TransitionOutcome, EngineError> {
    run_effects(ctx, &submit.on_always).await?;

    let branch = if valid { &submit.on_valid } else { &submit.on_invalid };
    run_effects(ctx, &branch.effects).await?;

    let Some(next_id) = branch.next else { return Ok(TransitionOutcome::Continue) };
    match invoke(ctx, next_id).await {
        Ok(Value::Null) => Ok(TransitionOutcome::Continue),
        Ok(goto) => Ok(TransitionOutcome::Goto(goto)),
        Err(e) => {
            tracing::warn!(node = %next_id, kind = e.kind.as_str(), "next evaluation failed");
            Err(EngineError::from(e))
        }
    }
}

async fn run_all_validations(ctx: &mut EvaluationContext<'_>, step: NodeId) -> Result<(), EngineError> {
    let ids: Vec<NodeId> = ctx
        .state
        .registry
        .ids()
        .filter(|&id| {
            ctx.state
                .metadata
                .get(id)
                .map(|m| m.is_current_step || m.is_descendant_of_step)
                .unwrap_or(false)
                && matches!(ctx.state.registry.get(id).map(|n| &n.kind), Some(AstNodeKind::Validation(_)))
        })
        .collect();
    let _ = step;
    for id in ids {
        invoke(ctx, id).await.ok();
    }
    Ok(())
}

/// Runs effects sequentially; the first failure aborts the rest and is
/// surfaced as a hard `EFFECT_FAILED` engine error.
async fn run_effects(ctx: &mut EvaluationContext<'_>, effects: &[NodeId]) -> Result<(), EngineError> {
    for &effect_id in effects {
        match invoke(ctx, effect_id).await {
            Ok(_) => {}
            Err(e) => {
                let failure = EvalError::at(ErrorKind::EffectFailed, effect_id, e.message);
                tracing::error!(node = %effect_id, "effect failed, aborting transition");
                return Err(EngineError::from(failure));
            }
        }
    }
    Ok(())
}

async fn truthy_or_skip(ctx: &mut EvaluationContext<'_>, node: NodeId) -> bool {
    match invoke(ctx, node).await {
        Ok(v) => is_truthy(&v),
        Err(_) => false,
    }
}

/// Finds the step whose declared `path` matches, marking its scope (and
/// clearing any prior step's) on the registry's metadata before returning.
pub fn locate_and_mark_step(ctx: &mut EvaluationContext<'_>, path: &str) -> Result<NodeId, EngineError> {
    let Some(AstNodeKind::Journey(journey)) = ctx.state.registry.get(ctx.compiled.root).map(|n| n.kind.clone())
    else {
        return Err(EngineError::Misuse("journey root is not a Journey node".into()));
    };
    for &step_id in &journey.steps {
        if let Some(AstNodeKind::Step(step_node)) = ctx.state.registry.get(step_id).map(|n| n.kind.clone()) {
            let step_node: StepNode = step_node;
            if step_node.path == path {
                form_ast::mark_step_scope(&ctx.state.registry, &mut ctx.state.metadata, step_id);
                return Ok(step_id);
            }
        }
    }
    let _: &JourneyNode = &journey;
    Err(EngineError::Misuse(format!("no step matches path '{path}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registries::FunctionRegistries;
    use crate::request::RequestShell;

    #[tokio::test]
    async fn access_with_no_on_access_continues() {
        let output = form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
        }))
        .unwrap();
        let functions = FunctionRegistries::new();
        let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));
        let step = locate_and_mark_step(&mut ctx, "/s").unwrap();
        let outcome = run_access(&mut ctx, step).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Continue);
    }

    #[tokio::test]
    async fn submit_with_no_on_submission_continues() {
        let output = form_ast::compile(&serde_json::json!({
            "type": "journey", "code": "a", "title": "A",
            "steps": [{ "type": "step", "path": "/s", "title": "S", "blocks": [] }],
        }))
        .unwrap();
        let functions = FunctionRegistries::new();
        let mut ctx = EvaluationContext::new(&output, &functions, RequestShell::new("/s"));
        let step = locate_and_mark_step(&mut ctx, "/s").unwrap();
        let outcome = run_submit(&mut ctx, step).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Continue);
    }
}

//! The per-request evaluation context: the single mutable handle threaded
//! through every handler call.

use crate::answers::{AnswerStore, MutationSource};
use crate::error::{ErrorKind, EvalError};
use crate::memo::MemoCache;
use crate::registries::FunctionRegistries;
use crate::request::RequestShell;
use crate::runtime::EngineConfig;
use crate::scope::{ScopeFrame, ScopeStack};
use form_ast::{AstNodeKind, CompileOutput, FunctionKind, NodeId, RuntimeCompileState};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRecord {
    pub block: NodeId,
    pub message: Value,
}

/// Everything a single access/action/submit evaluation run needs: the frozen
/// compiled journey, the request-scoped runtime overlay it may extend via
/// `ITERATE`, the registered functions, and the mutable state that
/// accumulates as handlers run (answers, ambient data, scope, memo cache,
/// collected validation failures).
pub struct EvaluationContext<'a> {
    pub compiled: &'a CompileOutput,
    pub state: RuntimeCompileState,
    pub functions: &'a FunctionRegistries,
    async_flags: HashMap<NodeId, bool>,
    pub request: RequestShell,
    pub answers: AnswerStore,
    pub data: Value,
    pub scope: ScopeStack,
    pub memo: MemoCache,
    pub cancel: CancellationToken,
    pub validations: Vec<ValidationRecord>,
    pub config: EngineConfig,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(compiled: &'a CompileOutput, functions: &'a FunctionRegistries, request: RequestShell) -> Self {
        Self::with_config(compiled, functions, request, EngineConfig::default())
    }

    pub fn with_config(
        compiled: &'a CompileOutput,
        functions: &'a FunctionRegistries,
        request: RequestShell,
        config: EngineConfig,
    ) -> Self {
        Self {
            compiled,
            state: RuntimeCompileState::from_compiled(compiled),
            functions,
            async_flags: HashMap::new(),
            request,
            answers: AnswerStore::new(),
            data: Value::Null,
            scope: ScopeStack::new(),
            memo: MemoCache::new(),
            cancel: CancellationToken::new(),
            validations: Vec::new(),
            config,
        }
    }

    pub fn seed_answer(&mut self, code: impl Into<String>, value: Value, source: MutationSource) {
        self.answers.seed(code, value, source);
    }

    pub fn record_validation_failure(&mut self, block: NodeId, message: Value) {
        self.validations.push(ValidationRecord { block, message });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), EvalError> {
        if self.is_cancelled() {
            Err(EvalError::new(ErrorKind::Cancelled, "evaluation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Whether evaluating `node` can suspend on I/O: true if it's an effect
    /// or generator function flagged async in the registry, or if any of its
    /// structural children is async. Memoized per context since the frozen
    /// half of the graph never changes across lookups within one request.
    pub fn is_async(&mut self, node: NodeId) -> bool {
        if let Some(&known) = self.async_flags.get(&node) {
            return known;
        }
        let result = self.compute_is_async(node);
        self.async_flags.insert(node, result);
        result
    }

    fn compute_is_async(&mut self, node: NodeId) -> bool {
        let Some(ast) = self.state.registry.get(node) else { return false };
        let self_async = match &ast.kind {
            AstNodeKind::Function(f) => match f.function_type {
                FunctionKind::Effect | FunctionKind::Generator => self.functions.is_async(f.function_type, &f.name),
                FunctionKind::Condition | FunctionKind::Transformer => false,
            },
            _ => false,
        };
        if self_async {
            return true;
        }
        let children: Vec<NodeId> = self.state.registry.children_of(node).into_iter().map(|c| c.node).collect();
        children.into_iter().any(|c| self.is_async(c))
    }

    pub fn effect_context(&mut self) -> EffectContext<'_, 'a> {
        EffectContext { ctx: self }
    }
}

/// The restricted view handed to effect functions: answers, data, and
/// request access without exposing the invoker or scope internals.
pub struct EffectContext<'ctx, 'a> {
    ctx: &'ctx mut EvaluationContext<'a>,
}

impl<'ctx, 'a> EffectContext<'ctx, 'a> {
    pub fn get_answer(&self, code: &str) -> Value {
        self.ctx.answers.current(code)
    }

    pub fn set_answer(&mut self, code: impl Into<String>, value: Value) {
        self.ctx.answers.record(code, value, MutationSource::Action);
    }

    pub fn get_data(&self) -> &Value {
        &self.ctx.data
    }

    pub fn set_data(&mut self, data: Value) {
        self.ctx.data = data;
    }

    pub fn request(&self) -> &RequestShell {
        &self.ctx.request
    }

    pub fn transition_type(&self) -> Option<&Value> {
        self.ctx.scope.lookup(crate::scope::KEY_TRANSITION_TYPE)
    }
}

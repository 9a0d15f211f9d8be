//! Per-request evaluation engine for compiled form journeys: the thunk
//! evaluator, function registries, and transition orchestrator that run
//! against a frozen [`form_ast::CompileOutput`].

pub mod answers;
pub mod context;
pub mod error;
pub mod handlers;
pub mod invoker;
pub mod memo;
pub mod registries;
pub mod request;
pub mod runtime;
pub mod scope;
pub mod transitions;

pub use answers::{AnswerStore, Mutation, MutationSource};
pub use context::{EvaluationContext, EffectContext, ValidationRecord};
pub use error::{EngineError, ErrorKind, EvalError};
pub use invoker::{eval_voln, invoke, invoke_sync};
pub use memo::{EvalResult, MemoCache};
pub use registries::{ConditionFn, EffectFn, FunctionRegistries, FunctionRegistryError, GeneratorFn, TransformerFn};
pub use request::RequestShell;
pub use runtime::EngineConfig;
pub use scope::{ScopeFrame, ScopeStack, TransitionType};
pub use transitions::{locate_and_mark_step, run_access, run_action, run_submit, TransitionOutcome};

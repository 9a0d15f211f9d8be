//! Evaluation-time error taxonomy.

use form_ast::{CompileError, NodeId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LookupFailed,
    TypeMismatch,
    EvaluationFailed,
    TransformerFailed,
    EffectFailed,
    SecurityViolation,
    Cancelled,
    EngineMisuse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LookupFailed => "LOOKUP_FAILED",
            ErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ErrorKind::EvaluationFailed => "EVALUATION_FAILED",
            ErrorKind::TransformerFailed => "TRANSFORMER_FAILED",
            ErrorKind::EffectFailed => "EFFECT_FAILED",
            ErrorKind::SecurityViolation => "SECURITY_VIOLATION",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::EngineMisuse => "ENGINE_MISUSE",
        }
    }
}

/// The error a handler attaches to its result. Deliberately not a `thiserror`
/// enum on its own: handlers construct these as data (the engine usually
/// converts an error into `undefined` rather than unwinding), while
/// [`EngineError`] below is the hard-failure type that does unwind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub node: Option<NodeId>,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, node: None, message: message.into() }
    }

    pub fn at(kind: ErrorKind, node: NodeId, message: impl Into<String>) -> Self {
        Self { kind, node: Some(node), message: message.into() }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node {
            Some(node) => write!(f, "{} at {}: {}", self.kind.as_str(), node, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl std::error::Error for EvalError {}

/// Hard engine failures: compilation failures surfacing from a runtime
/// materialization, or programmer misuse of the invoker. These unwind rather
/// than becoming an `undefined` result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A handler-level [`EvalError`] that escaped to a hard failure (an
    /// effect, or a `next` evaluation) — the original `kind`/`node` survive
    /// here rather than collapsing into a string.
    #[error("{0}")]
    Evaluation(EvalError),

    #[error("{0}")]
    Misuse(String),

    #[error("evaluation was cancelled")]
    Cancelled,
}

impl From<EvalError> for EngineError {
    fn from(e: EvalError) -> Self {
        match e.kind {
            ErrorKind::Cancelled => EngineError::Cancelled,
            ErrorKind::EngineMisuse => EngineError::Misuse(e.message),
            _ => EngineError::Evaluation(e),
        }
    }
}

//! Compile-time error taxonomy: schema violations, plus the wiring/registry
//! failures that can only occur on a malformed compilation.

use crate::graph::WiringError;
use crate::registry::RegistryError;
use thiserror::Error;

/// One schema or serializability violation, aggregated with the others found
/// in the same compilation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// JSON-pointer-shaped path to the offending value, e.g. `/steps/0/blocks/2/code`.
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{} schema violation(s): {}", .0.len(), summarize(.0))]
    SchemaViolation(Vec<SchemaIssue>),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unrecognized expression discriminator at {path}")]
    UnknownDiscriminator { path: String },
}

fn summarize(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({})", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

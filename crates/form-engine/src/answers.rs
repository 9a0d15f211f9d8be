//! Per-request answer store: current value plus full mutation history,
//! keyed by field code.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationSource {
    /// Set by an action effect during this request.
    Action,
    /// Derived from the field's `formatPipeline`.
    Processed,
    /// Read straight from the POST body.
    Post,
    /// Derived from the field's `defaultValue`.
    Default,
    /// Loaded from persisted state before this request began.
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub value: Value,
    pub source: MutationSource,
}

#[derive(Debug, Clone, Default)]
struct AnswerEntry {
    current: Value,
    mutations: Vec<Mutation>,
}

/// `global.answers`: one entry per field code, each carrying the current
/// value plus the ordered history of how it got there.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    entries: HashMap<String, AnswerEntry>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, code: &str) -> Value {
        self.entries.get(code).map(|e| e.current.clone()).unwrap_or(Value::Null)
    }

    pub fn mutations(&self, code: &str) -> &[Mutation] {
        self.entries.get(code).map(|e| e.mutations.as_slice()).unwrap_or(&[])
    }

    pub fn latest_source(&self, code: &str) -> Option<MutationSource> {
        self.entries.get(code).and_then(|e| e.mutations.last()).map(|m| m.source)
    }

    pub fn has_mutation_from(&self, code: &str, source: MutationSource) -> bool {
        self.mutations(code).iter().any(|m| m.source == source)
    }

    /// Load a pre-request value without recording it as a mutation. Used to
    /// seed `current` from persisted state before the request's own fill
    /// order runs.
    pub fn seed(&mut self, code: impl Into<String>, value: Value, source: MutationSource) {
        let entry = self.entries.entry(code.into()).or_default();
        entry.current = value.clone();
        entry.mutations.push(Mutation { value, source });
    }

    /// Record a new mutation and update `current`.
    pub fn record(&mut self, code: impl Into<String>, value: Value, source: MutationSource) {
        let entry = self.entries.entry(code.into()).or_default();
        entry.current = value.clone();
        entry.mutations.push(Mutation { value, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_defaults_to_null_for_unknown_codes() {
        let store = AnswerStore::new();
        assert_eq!(store.current("missing"), Value::Null);
    }

    #[test]
    fn record_updates_current_and_appends_history() {
        let mut store = AnswerStore::new();
        store.record("firstName", Value::from("Alice"), MutationSource::Post);
        store.record("firstName", Value::from("Alicia"), MutationSource::Action);
        assert_eq!(store.current("firstName"), Value::from("Alicia"));
        assert_eq!(store.mutations("firstName").len(), 2);
        assert_eq!(store.latest_source("firstName"), Some(MutationSource::Action));
    }
}

//! The inbound request surface a transition run is evaluated against.

use serde_json::Value;

/// The three external JSON sources a compiled journey can reference
/// (`query`, `params`, `post`), plus the transition-selection fields that
/// decide which of a step's `onAccess` / `onAction` / `onSubmission` groups
/// runs.
#[derive(Debug, Clone)]
pub struct RequestShell {
    pub query: Value,
    pub params: Value,
    pub post: Value,
    /// Opaque session handle; the engine never interprets its contents, only
    /// threads it through to effect functions that need it.
    pub session: String,
    pub step_path: String,
    pub action_name: Option<String>,
}

impl RequestShell {
    pub fn new(step_path: impl Into<String>) -> Self {
        Self {
            query: Value::Object(Default::default()),
            params: Value::Object(Default::default()),
            post: Value::Object(Default::default()),
            session: String::new(),
            step_path: step_path.into(),
            action_name: None,
        }
    }

    pub fn with_post(mut self, post: Value) -> Self {
        self.post = post;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_action(mut self, action_name: impl Into<String>) -> Self {
        self.action_name = Some(action_name.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn source(&self, pseudo_type: form_ast::PseudoNodeType, key: &str) -> Value {
        let object = match pseudo_type {
            form_ast::PseudoNodeType::Query => &self.query,
            form_ast::PseudoNodeType::Params => &self.params,
            form_ast::PseudoNodeType::Post => &self.post,
            _ => return Value::Null,
        };
        object.get(key).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_reads_the_matching_object_by_key() {
        let req = RequestShell::new("/start").with_query(json!({ "ref": "abc" }));
        assert_eq!(req.source(form_ast::PseudoNodeType::Query, "ref"), Value::from("abc"));
        assert_eq!(req.source(form_ast::PseudoNodeType::Post, "ref"), Value::Null);
    }
}

//! The three (plus generator) function registries author code plugs into:
//! conditions, transformers, effects, generators. Append-only, keyed by name.

use crate::context::EffectContext;
use crate::error::{ErrorKind, EvalError};
use async_trait::async_trait;
use form_ast::FunctionKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FunctionRegistryError {
    #[error("function '{0}' is already registered in this registry")]
    Duplicate(String),
}

/// A pure predicate: `(subject, args) -> bool`. Must not suspend on I/O,
/// matching the contract in the component design.
pub trait ConditionFn: Send + Sync {
    fn call(&self, subject: &Value, args: &[Value]) -> Result<bool, EvalError>;
    fn is_async(&self) -> bool {
        false
    }
}

/// A pure value transformer: `(value, args) -> value`.
pub trait TransformerFn: Send + Sync {
    fn call(&self, value: &Value, args: &[Value]) -> Result<Value, EvalError>;
    fn is_async(&self) -> bool {
        false
    }
}

/// An imperative effect, run with a controlled view over the evaluation
/// context's answers/data/request surface.
#[async_trait]
pub trait EffectFn: Send + Sync {
    async fn call(&self, ctx: &mut EffectContext<'_, '_>, args: &[Value]) -> Result<Value, EvalError>;
    fn is_async(&self) -> bool {
        true
    }
}

/// A value-producing function with no predicate/transform contract of its
/// own (e.g. an ID generator, a timestamp source).
#[async_trait]
pub trait GeneratorFn: Send + Sync {
    async fn call(&self, args: &[Value]) -> Result<Value, EvalError>;
    fn is_async(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct FunctionRegistries {
    conditions: HashMap<String, Arc<dyn ConditionFn>>,
    transformers: HashMap<String, Arc<dyn TransformerFn>>,
    effects: HashMap<String, Arc<dyn EffectFn>>,
    generators: HashMap<String, Arc<dyn GeneratorFn>>,
}

impl FunctionRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_condition(&mut self, name: impl Into<String>, f: Arc<dyn ConditionFn>) -> Result<(), FunctionRegistryError> {
        let name = name.into();
        if self.conditions.contains_key(&name) {
            return Err(FunctionRegistryError::Duplicate(name));
        }
        self.conditions.insert(name, f);
        Ok(())
    }

    pub fn register_transformer(&mut self, name: impl Into<String>, f: Arc<dyn TransformerFn>) -> Result<(), FunctionRegistryError> {
        let name = name.into();
        if self.transformers.contains_key(&name) {
            return Err(FunctionRegistryError::Duplicate(name));
        }
        self.transformers.insert(name, f);
        Ok(())
    }

    pub fn register_effect(&mut self, name: impl Into<String>, f: Arc<dyn EffectFn>) -> Result<(), FunctionRegistryError> {
        let name = name.into();
        if self.effects.contains_key(&name) {
            return Err(FunctionRegistryError::Duplicate(name));
        }
        self.effects.insert(name, f);
        Ok(())
    }

    pub fn register_generator(&mut self, name: impl Into<String>, f: Arc<dyn GeneratorFn>) -> Result<(), FunctionRegistryError> {
        let name = name.into();
        if self.generators.contains_key(&name) {
            return Err(FunctionRegistryError::Duplicate(name));
        }
        self.generators.insert(name, f);
        Ok(())
    }

    pub fn is_async(&self, kind: FunctionKind, name: &str) -> bool {
        match kind {
            FunctionKind::Condition => self.conditions.get(name).map(|f| f.is_async()).unwrap_or(false),
            FunctionKind::Transformer => self.transformers.get(name).map(|f| f.is_async()).unwrap_or(false),
            FunctionKind::Effect => self.effects.get(name).map(|f| f.is_async()).unwrap_or(true),
            FunctionKind::Generator => self.generators.get(name).map(|f| f.is_async()).unwrap_or(false),
        }
    }

    pub fn call_condition(&self, name: &str, subject: &Value, args: &[Value]) -> Result<bool, EvalError> {
        let f = self.conditions.get(name).ok_or_else(|| not_found(name))?;
        f.call(subject, args)
    }

    pub fn call_transformer(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value, EvalError> {
        let f = self.transformers.get(name).ok_or_else(|| not_found(name))?;
        f.call(value, args).map_err(|e| EvalError::new(ErrorKind::TransformerFailed, e.message))
    }

    pub async fn call_effect(&self, name: &str, ctx: &mut EffectContext<'_, '_>, args: &[Value]) -> Result<Value, EvalError> {
        let f = self.effects.get(name).cloned().ok_or_else(|| not_found(name))?;
        f.call(ctx, args).await.map_err(|e| EvalError::new(ErrorKind::EffectFailed, e.message))
    }

    pub async fn call_generator(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let f = self.generators.get(name).cloned().ok_or_else(|| not_found(name))?;
        f.call(args).await
    }
}

fn not_found(name: &str) -> EvalError {
    EvalError::new(ErrorKind::LookupFailed, format!("function '{name}' is not registered"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IsNonEmpty;
    impl ConditionFn for IsNonEmpty {
        fn call(&self, subject: &Value, _args: &[Value]) -> Result<bool, EvalError> {
            Ok(match subject {
                Value::String(s) => !s.is_empty(),
                Value::Null => false,
                _ => true,
            })
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registries = FunctionRegistries::new();
        registries.register_condition("isNonEmpty", Arc::new(IsNonEmpty)).unwrap();
        let err = registries.register_condition("isNonEmpty", Arc::new(IsNonEmpty)).unwrap_err();
        assert_eq!(err, FunctionRegistryError::Duplicate("isNonEmpty".into()));
    }

    #[test]
    fn calling_an_unregistered_condition_is_lookup_failed() {
        let registries = FunctionRegistries::new();
        let err = registries.call_condition("missing", &Value::Null, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LookupFailed);
    }
}

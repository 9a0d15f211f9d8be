//! The scope stack pushed by iteration and transition handlers.

use serde_json::Value;
use std::collections::HashMap;

pub const KEY_INDEX: &str = "@index";
pub const KEY_ITEM: &str = "@item";
pub const KEY_KEY: &str = "@key";
pub const KEY_VALUE: &str = "@value";
pub const KEY_TYPE: &str = "@type";
pub const KEY_TRANSITION_TYPE: &str = "@transitionType";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    Access,
    Action,
    Load,
    Submit,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionType::Access => "access",
            TransitionType::Action => "action",
            TransitionType::Load => "load",
            TransitionType::Submit => "submit",
        }
    }
}

/// A single scope frame: an indexable mapping from key to value, identified
/// by a monotonic ID distinct from its contents so the memoization cache can
/// key on "which frames are active" without hashing frame bodies.
#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub(crate) id: u64,
    fields: HashMap<String, Value>,
}

impl ScopeFrame {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn iterator_item(index: usize, item: Value, key: Option<String>) -> Self {
        let mut frame = ScopeFrame::default();
        if let Value::Object(map) = &item {
            for (k, v) in map {
                frame.set(k.clone(), v.clone());
            }
        }
        frame.set(KEY_INDEX, Value::from(index));
        frame.set(KEY_ITEM, item);
        frame.set(KEY_TYPE, Value::from("iterator"));
        if let Some(k) = key {
            frame.set(KEY_KEY, Value::from(k));
        }
        frame
    }

    pub fn transition(transition_type: TransitionType) -> Self {
        let mut frame = ScopeFrame::default();
        frame.set(KEY_TRANSITION_TYPE, Value::from(transition_type.as_str()));
        frame
    }
}

/// The live stack of scope frames, innermost last. `identity()` captures the
/// set of active frame IDs for memoization keys.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
    next_id: u64,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, mut frame: ScopeFrame) {
        frame.id = self.next_id;
        self.next_id += 1;
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    /// innermost-first lookup across the whole stack.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(key))
    }

    /// `scope[i]`, 0 = innermost.
    pub fn at(&self, index: usize) -> Option<&ScopeFrame> {
        self.frames.iter().rev().nth(index)
    }

    pub fn identity(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.id).collect()
    }
}

/// Run `f` with `frame` pushed, guaranteeing the pop happens on every exit
/// path including an `Err` return from `f`.
pub fn with_scope<T>(stack: &mut ScopeStack, frame: ScopeFrame, f: impl FnOnce(&mut ScopeStack) -> T) -> T {
    stack.push(frame);
    let result = f(stack);
    stack.pop();
    result
}

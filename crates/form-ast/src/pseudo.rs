//! Pseudo nodes: synthetic nodes standing in for external inputs.

use crate::ids::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoNodeType {
    Answer,
    Data,
    Query,
    Params,
    Post,
    /// Per-request fill-order pseudo for a field on the active step.
    AnswerLocal,
}

impl PseudoNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoNodeType::Answer => "answers",
            PseudoNodeType::Data => "data",
            PseudoNodeType::Query => "query",
            PseudoNodeType::Params => "params",
            PseudoNodeType::Post => "post",
            PseudoNodeType::AnswerLocal => "answers_local",
        }
    }

    /// Maps a `REFERENCE` path's first segment to the pseudo type it reads
    /// from.
    pub fn from_reference_type(ref_type: &str) -> Option<Self> {
        match ref_type {
            "answers" => Some(PseudoNodeType::Answer),
            "data" => Some(PseudoNodeType::Data),
            "query" => Some(PseudoNodeType::Query),
            "params" => Some(PseudoNodeType::Params),
            "post" => Some(PseudoNodeType::Post),
            _ => None,
        }
    }
}

/// A synthesized pseudo node, keyed by `(type, external key)` and coalesced
/// across all authored references that touch the same external input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PseudoKey {
    pub pseudo_type: PseudoNodeType,
    pub key: String,
}

impl PseudoKey {
    pub fn new(pseudo_type: PseudoNodeType, key: impl Into<String>) -> Self {
        Self { pseudo_type, key: key.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoNode {
    pub id: NodeId,
    pub key: PseudoKey,
}

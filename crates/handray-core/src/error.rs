//! Error types for the selection core.

use thiserror::Error;

use crate::types::TargetId;

/// Malformed or error-carrying inbound message. Never fatal to a connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid landmark payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },

    #[error("landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },

    #[error("tracking service error: {0}")]
    Server(String),
}

/// Invalid use of the target registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("target {0} is already registered")]
    DuplicateTarget(TargetId),

    #[error("target {0} is not registered")]
    UnknownTarget(TargetId),

    #[error("invalid target {id}: {detail}")]
    InvalidTarget { id: TargetId, detail: String },
}

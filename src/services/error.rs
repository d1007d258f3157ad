//! Errors raised by the moderation services

use thiserror::Error;

use crate::models::{ContentKind, ReviewStatus};

/// Moderation service errors
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ContentKind, id: String },

    #[error("Permission denied")]
    Forbidden,

    #[error("Cannot {action} content in {from} state")]
    InvalidTransition {
        from: ReviewStatus,
        action: &'static str,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Publish side effect failed: {0}")]
    SideEffectFailure(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ModerationError {
    pub fn not_found(kind: ContentKind, id: impl ToString) -> Self {
        ModerationError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

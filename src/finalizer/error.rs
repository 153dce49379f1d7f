//! Error types for finalization.
//!
//! Every variant is terminal for a single `finalize` call: nothing is retried
//! and no partial result is ever returned alongside an error.

use thiserror::Error;

use crate::error::LlmError;

/// Longest slice of a raw reply included in the `Display` output.
const RAW_PREVIEW_CHARS: usize = 200;

/// Errors that can occur during a finalization.
#[derive(Debug, Error)]
pub enum FinalizerError {
    /// The request was rejected before any inference call was made.
    #[error("Invalid finalization request: {0}")]
    InvalidRequest(String),

    /// The inference backend failed to produce a reply.
    #[error("Inference transport error: {0}")]
    InferenceTransport(#[from] LlmError),

    /// A reply was received but does not satisfy the result contract.
    #[error("Failed to decode finalization reply: {reason} (reply starts with: '{}')", preview(.raw))]
    Decode { raw: String, reason: String },
}

impl FinalizerError {
    pub(crate) fn decode(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        FinalizerError::Decode {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// The raw model reply, for decode failures.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            FinalizerError::Decode { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

fn preview(raw: &str) -> String {
    raw.trim().chars().take(RAW_PREVIEW_CHARS).collect()
}

/// Result type alias for finalizer operations.
pub type FinalizerResult<T> = Result<T, FinalizerError>;

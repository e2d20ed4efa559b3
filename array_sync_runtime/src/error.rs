//! Runtime error taxonomy.

use std::io;

use array_sync_kernel::ArrayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The push could not be delivered. Local state has already been
    /// updated; retrying is the caller's call.
    #[error("session unavailable: {reason}")]
    SessionUnavailable { reason: String },

    /// An instance validator rejected the value; nothing was installed.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed log frame, JSON payload or push record.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("sequence violation: expected {expected}, got {actual}")]
    SequenceViolation { expected: u64, actual: u64 },
}

impl SyncError {
    pub fn session_unavailable(reason: impl Into<String>) -> Self {
        SyncError::SessionUnavailable {
            reason: reason.into(),
        }
    }

    pub fn is_session_unavailable(&self) -> bool {
        matches!(self, SyncError::SessionUnavailable { .. })
    }
}

//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Largest push-log frame accepted by default (256 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Upper bound on a single encoded push-log frame, checked on write
    /// and on read.
    pub max_frame_len: usize,
    /// fsync the push log after every frame.
    pub fsync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            fsync: true,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::Decode(format!("Bad config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

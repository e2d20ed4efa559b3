//! Push records — what a model hands to a session.
//!
//! Records are pure data. Sessions decide where they go (memory, a log,
//! a real transport); the mirror decides what they mean to a consumer.

use bytes::Bytes;
use serde_json::{json, Map, Value};

use array_sync_kernel::hashing::envelope_digest;
use array_sync_kernel::Envelope;

use crate::identity::ModelIdentity;

/// Custom message method for partial array updates.
pub const UPDATE_SEGMENT_METHOD: &str = "update_array_segment";

/// Value of one named field update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Binary array snapshot.
    Envelope(Envelope),
    /// Plain JSON metadata.
    Json(Value),
}

impl FieldValue {
    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            FieldValue::Envelope(env) => Some(env),
            FieldValue::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            FieldValue::Envelope(_) => None,
        }
    }

    /// Envelope digest, `None` for JSON fields.
    pub fn digest(&self) -> Option<String> {
        self.as_envelope().map(envelope_digest)
    }
}

/// Partial update: flat element `starts[i]` receives `buffers[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUpdate {
    pub field: String,
    pub starts: Vec<u64>,
    pub buffers: Vec<Bytes>,
}

impl SegmentUpdate {
    /// JSON body of the custom message; buffers travel alongside it.
    pub fn message(&self) -> Value {
        json!({
            "method": UPDATE_SEGMENT_METHOD,
            "name": self.field,
            "starts": self.starts,
        })
    }
}

/// Something a model asked its session to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Creation handshake.
    Opened {
        model_name: String,
        model_module: String,
        model_module_version: String,
        state: Map<String, Value>,
    },
    Field {
        field: String,
        value: FieldValue,
    },
    Segments(SegmentUpdate),
}

impl PushEvent {
    pub fn opened(identity: &ModelIdentity, state: &Map<String, Value>) -> Self {
        PushEvent::Opened {
            model_name: identity.model_name.to_string(),
            model_module: identity.model_module.to_string(),
            model_module_version: identity.model_module_version.to_string(),
            state: state.clone(),
        }
    }
}

/// A push event bound to its channel and position.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    /// Strictly increasing per session, starting at 1.
    pub sequence: u64,
    pub comm_id: String,
    pub event: PushEvent,
}

//! Hand-written protobuf types for the push log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the on-disk format; never renumber.

use bytes::Bytes;
use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

/// Binary envelope. Tags follow the wire field order: buffer, shape, dtype.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoEnvelope {
    #[prost(bytes = "bytes", tag = "1")]
    pub buffer: Bytes,
    #[prost(uint64, repeated, tag = "2")]
    pub shape: Vec<u64>,
    #[prost(string, tag = "3")]
    pub dtype: String,
}

// ── Push record ────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoPushRecord {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(string, tag = "2")]
    pub comm_id: String,
    #[prost(oneof = "PushKind", tags = "3, 4, 5")]
    pub kind: Option<PushKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum PushKind {
    #[prost(message, tag = "3")]
    Open(ProtoOpen),
    #[prost(message, tag = "4")]
    Field(ProtoFieldUpdate),
    #[prost(message, tag = "5")]
    Segments(ProtoSegmentUpdate),
}

// ── Push kinds ─────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoOpen {
    #[prost(string, tag = "1")]
    pub model_name: String,
    #[prost(string, tag = "2")]
    pub model_module: String,
    #[prost(string, tag = "3")]
    pub model_module_version: String,
    /// Handshake state as a JSON object.
    #[prost(string, tag = "4")]
    pub state_json: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoFieldUpdate {
    #[prost(string, tag = "1")]
    pub field: String,
    #[prost(oneof = "FieldPayload", tags = "2, 3")]
    pub payload: Option<FieldPayload>,
    /// Envelope digest (lowercase hex); empty for JSON payloads.
    #[prost(string, tag = "4")]
    pub digest: String,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum FieldPayload {
    #[prost(message, tag = "2")]
    Envelope(ProtoEnvelope),
    #[prost(string, tag = "3")]
    Json(String),
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoSegmentUpdate {
    #[prost(string, tag = "1")]
    pub field: String,
    #[prost(uint64, repeated, tag = "2")]
    pub starts: Vec<u64>,
    #[prost(bytes = "bytes", repeated, tag = "3")]
    pub buffers: Vec<Bytes>,
}

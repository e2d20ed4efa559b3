//! Proto ↔ runtime conversion bridge.
//!
//! Converts between the protobuf log types (proto_types.rs) and the
//! runtime's push records. Decoding is strict: unknown dtype tags, missing
//! oneofs, bad JSON and digest mismatches are all errors, never defaults.

use serde_json::{Map, Value};

use array_sync_kernel::Envelope;

use crate::error::SyncError;
use crate::proto_types::*;
use crate::push::{FieldValue, PushEvent, PushRecord, SegmentUpdate};

pub fn envelope_to_proto(envelope: &Envelope) -> ProtoEnvelope {
    ProtoEnvelope {
        buffer: envelope.buffer.clone(),
        shape: envelope.wire_shape(),
        dtype: envelope.dtype.as_str().to_string(),
    }
}

/// Fails with `UnknownElementType` for a tag outside the registry.
pub fn proto_to_envelope(proto: &ProtoEnvelope) -> Result<Envelope, SyncError> {
    Ok(Envelope::from_parts(
        proto.buffer.clone(),
        &proto.shape,
        &proto.dtype,
    )?)
}

pub fn field_to_proto(field: &str, value: &FieldValue) -> ProtoFieldUpdate {
    let payload = match value {
        FieldValue::Envelope(env) => FieldPayload::Envelope(envelope_to_proto(env)),
        FieldValue::Json(v) => FieldPayload::Json(v.to_string()),
    };
    ProtoFieldUpdate {
        field: field.to_string(),
        payload: Some(payload),
        digest: value.digest().unwrap_or_default(),
    }
}

/// Decode a field update, verifying the envelope digest when present.
pub fn proto_to_field(proto: &ProtoFieldUpdate) -> Result<(String, FieldValue), SyncError> {
    let payload = proto
        .payload
        .as_ref()
        .ok_or_else(|| SyncError::Decode(format!("field {:?} has no payload", proto.field)))?;
    let value = match payload {
        FieldPayload::Envelope(env) => FieldValue::Envelope(proto_to_envelope(env)?),
        FieldPayload::Json(text) => FieldValue::Json(parse_json(text)?),
    };
    if !proto.digest.is_empty() {
        let computed = value.digest().unwrap_or_default();
        if computed != proto.digest {
            return Err(SyncError::Decode(format!(
                "digest mismatch for field {:?}: recorded {}, computed {}",
                proto.field, proto.digest, computed
            )));
        }
    }
    Ok((proto.field.clone(), value))
}

pub fn segments_to_proto(update: &SegmentUpdate) -> ProtoSegmentUpdate {
    ProtoSegmentUpdate {
        field: update.field.clone(),
        starts: update.starts.clone(),
        buffers: update.buffers.clone(),
    }
}

pub fn proto_to_segments(proto: &ProtoSegmentUpdate) -> Result<SegmentUpdate, SyncError> {
    if proto.starts.len() != proto.buffers.len() {
        return Err(SyncError::Decode(format!(
            "segment update has {} starts but {} buffers",
            proto.starts.len(),
            proto.buffers.len()
        )));
    }
    Ok(SegmentUpdate {
        field: proto.field.clone(),
        starts: proto.starts.clone(),
        buffers: proto.buffers.clone(),
    })
}

pub fn record_to_proto(record: &PushRecord) -> ProtoPushRecord {
    let kind = match &record.event {
        PushEvent::Opened {
            model_name,
            model_module,
            model_module_version,
            state,
        } => PushKind::Open(ProtoOpen {
            model_name: model_name.clone(),
            model_module: model_module.clone(),
            model_module_version: model_module_version.clone(),
            state_json: Value::Object(state.clone()).to_string(),
        }),
        PushEvent::Field { field, value } => PushKind::Field(field_to_proto(field, value)),
        PushEvent::Segments(update) => PushKind::Segments(segments_to_proto(update)),
    };
    ProtoPushRecord {
        sequence: record.sequence,
        comm_id: record.comm_id.clone(),
        kind: Some(kind),
    }
}

pub fn proto_to_record(proto: &ProtoPushRecord) -> Result<PushRecord, SyncError> {
    let kind = proto.kind.as_ref().ok_or_else(|| {
        SyncError::Decode(format!("push record {} has no kind", proto.sequence))
    })?;
    let event = match kind {
        PushKind::Open(open) => PushEvent::Opened {
            model_name: open.model_name.clone(),
            model_module: open.model_module.clone(),
            model_module_version: open.model_module_version.clone(),
            state: parse_state(&open.state_json)?,
        },
        PushKind::Field(update) => {
            let (field, value) = proto_to_field(update)?;
            PushEvent::Field { field, value }
        }
        PushKind::Segments(update) => PushEvent::Segments(proto_to_segments(update)?),
    };
    Ok(PushRecord {
        sequence: proto.sequence,
        comm_id: proto.comm_id.clone(),
        event,
    })
}

fn parse_json(text: &str) -> Result<Value, SyncError> {
    serde_json::from_str(text).map_err(|e| SyncError::Decode(format!("bad JSON payload: {}", e)))
}

fn parse_state(text: &str) -> Result<Map<String, Value>, SyncError> {
    match parse_json(text)? {
        Value::Object(map) => Ok(map),
        other => Err(SyncError::Decode(format!(
            "handshake state must be an object, got {}",
            other
        ))),
    }
}

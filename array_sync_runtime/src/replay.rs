//! Consumer-side mirror — rebuild what a remote front end sees.
//!
//! Applies push records in order: handshakes create models, field updates
//! decode envelopes, segment messages splice bytes into a fresh copy of the
//! mirrored array. Pure function of the record stream.

use std::collections::BTreeMap;

use serde_json::Value;

use array_sync_kernel::{decode, TensorValue};

use crate::error::SyncError;
use crate::identity::is_identity_key;
use crate::push::{FieldValue, PushEvent, PushRecord, SegmentUpdate};
use crate::push_log::PushLog;

/// One field as the consumer holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorField {
    Array(TensorValue),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorModel {
    pub model_name: String,
    pub model_module: String,
    pub model_module_version: String,
    pub fields: BTreeMap<String, MirrorField>,
}

impl MirrorModel {
    pub fn array(&self, field: &str) -> Option<&TensorValue> {
        match self.fields.get(field) {
            Some(MirrorField::Array(t)) => Some(t),
            _ => None,
        }
    }

    pub fn json(&self, field: &str) -> Option<&Value> {
        match self.fields.get(field) {
            Some(MirrorField::Json(v)) => Some(v),
            _ => None,
        }
    }
}

/// All models seen on one session, keyed by comm id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    models: BTreeMap<String, MirrorModel>,
    last_sequence: u64,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self, comm_id: &str) -> Option<&MirrorModel> {
        self.models.get(comm_id)
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &MirrorModel)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Apply one record. Records must arrive in sequence order.
    pub fn apply(&mut self, record: &PushRecord) -> Result<(), SyncError> {
        if record.sequence <= self.last_sequence {
            return Err(SyncError::SequenceViolation {
                expected: self.last_sequence + 1,
                actual: record.sequence,
            });
        }

        match &record.event {
            PushEvent::Opened {
                model_name,
                model_module,
                model_module_version,
                state,
            } => {
                let fields = state
                    .iter()
                    .filter(|(k, _)| !is_identity_key(k))
                    .map(|(k, v)| (k.clone(), MirrorField::Json(v.clone())))
                    .collect();
                self.models.insert(
                    record.comm_id.clone(),
                    MirrorModel {
                        model_name: model_name.clone(),
                        model_module: model_module.clone(),
                        model_module_version: model_module_version.clone(),
                        fields,
                    },
                );
            }
            PushEvent::Field { field, value } => {
                let mirrored = match value {
                    FieldValue::Envelope(env) => MirrorField::Array(decode(env)?),
                    FieldValue::Json(v) => MirrorField::Json(v.clone()),
                };
                self.model_mut(&record.comm_id)?
                    .fields
                    .insert(field.clone(), mirrored);
            }
            PushEvent::Segments(update) => {
                let model = self.model_mut(&record.comm_id)?;
                let current = model.array(&update.field).ok_or_else(|| {
                    SyncError::Decode(format!(
                        "segment update for {:?} before any array",
                        update.field
                    ))
                })?;
                let patched = apply_segments(current, update)?;
                model
                    .fields
                    .insert(update.field.clone(), MirrorField::Array(patched));
            }
        }

        self.last_sequence = record.sequence;
        Ok(())
    }

    fn model_mut(&mut self, comm_id: &str) -> Result<&mut MirrorModel, SyncError> {
        self.models
            .get_mut(comm_id)
            .ok_or_else(|| SyncError::Decode(format!("push for unopened channel {:?}", comm_id)))
    }
}

/// Splice every segment of `update` into a copy of `array`.
pub fn apply_segments(
    array: &TensorValue,
    update: &SegmentUpdate,
) -> Result<TensorValue, SyncError> {
    if update.starts.len() != update.buffers.len() {
        return Err(SyncError::Decode(format!(
            "segment update has {} starts but {} buffers",
            update.starts.len(),
            update.buffers.len()
        )));
    }
    let mut patched = array.clone();
    for (&start, buffer) in update.starts.iter().zip(&update.buffers) {
        let start = usize::try_from(start)
            .map_err(|_| SyncError::Decode(format!("segment start {} too large", start)))?;
        patched = patched.splice_segment(start, buffer)?;
    }
    Ok(patched)
}

/// Rebuild the consumer view from a record stream.
pub fn rebuild(records: &[PushRecord]) -> Result<Mirror, SyncError> {
    let mut mirror = Mirror::new();
    for record in records {
        mirror.apply(record)?;
    }
    Ok(mirror)
}

/// Rebuild the consumer view from everything in a push log.
pub fn rebuild_from_log(log: &PushLog) -> Result<Mirror, SyncError> {
    rebuild(&log.load_all()?)
}

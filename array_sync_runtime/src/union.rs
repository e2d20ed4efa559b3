//! Data union — a field that holds either an inline array or a reference
//! to another array model.
//!
//! Inline arrays travel as envelopes; references travel as the JSON string
//! `"IPY_MODEL_<comm id>"`, letting several models share one array without
//! sending it twice.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use array_sync_kernel::{decode, encode, ElementType, TensorValue};

use crate::error::SyncError;
use crate::model::{check_shape, NdArrayModel, SyncValue, SynchronizedModel};
use crate::push::FieldValue;
use crate::session::MODEL_REF_PREFIX;

#[derive(Clone)]
pub enum DataUnion {
    Array(TensorValue),
    Model(Arc<NdArrayModel>),
}

impl DataUnion {
    pub fn to_field(&self) -> FieldValue {
        match self {
            DataUnion::Array(t) => FieldValue::Envelope(encode(t)),
            DataUnion::Model(m) => FieldValue::Json(Value::String(m.handle().model_ref())),
        }
    }

    /// Decode a received field. `resolve` maps a comm id to a live model.
    pub fn from_field<R>(value: &FieldValue, resolve: R) -> Result<Self, SyncError>
    where
        R: Fn(&str) -> Option<Arc<NdArrayModel>>,
    {
        match value {
            FieldValue::Envelope(env) => Ok(DataUnion::Array(decode(env)?)),
            FieldValue::Json(Value::String(reference)) => {
                let comm_id = reference.strip_prefix(MODEL_REF_PREFIX).ok_or_else(|| {
                    SyncError::Decode(format!("not a model reference: {:?}", reference))
                })?;
                resolve(comm_id).map(DataUnion::Model).ok_or_else(|| {
                    SyncError::Decode(format!("unknown model reference: {:?}", reference))
                })
            }
            FieldValue::Json(other) => Err(SyncError::Decode(format!(
                "data union must be an array or a model reference, got {}",
                other
            ))),
        }
    }

    /// The array behind the union, following a reference if needed.
    pub fn array(&self) -> Option<TensorValue> {
        match self {
            DataUnion::Array(t) => Some(t.clone()),
            DataUnion::Model(m) => m.get_array(),
        }
    }

    /// Check the element type and shape of whatever array the union
    /// currently holds. A referenced model with no value yet passes.
    pub fn validate(
        &self,
        dtype: Option<ElementType>,
        shape: Option<&[Option<usize>]>,
    ) -> Result<(), SyncError> {
        let Some(array) = self.array() else {
            return Ok(());
        };
        if let Some(expected) = dtype {
            if array.dtype() != expected {
                return Err(SyncError::ValidationFailed(format!(
                    "data union expected dtype {}, got {}",
                    expected,
                    array.dtype()
                )));
            }
        }
        if let Some(dims) = shape {
            check_shape(array.shape(), dims)
                .map_err(|e| SyncError::ValidationFailed(format!("data union {}", e)))?;
        }
        Ok(())
    }
}

impl fmt::Debug for DataUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataUnion::Array(t) => f.debug_tuple("Array").field(t).finish(),
            DataUnion::Model(m) => f.debug_tuple("Model").field(m.handle()).finish(),
        }
    }
}

impl<V: SyncValue> SynchronizedModel<V> {
    /// Validate a union against optional dtype and shape constraints and
    /// push it as `name`.
    pub fn set_union(
        &self,
        name: &str,
        union: &DataUnion,
        dtype: Option<ElementType>,
        shape: Option<&[Option<usize>]>,
    ) -> Result<(), SyncError> {
        union.validate(dtype, shape)?;
        self.set_field(name, union.to_field())
    }
}

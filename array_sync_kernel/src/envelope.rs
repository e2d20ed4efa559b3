//! Binary Envelope Encoder — TensorValue ⇄ {buffer, shape, dtype}.
//!
//! Field order is fixed: buffer, shape, dtype. Consumers must not depend on
//! it, producers always emit it (serde derive keeps declaration order).
//!
//! The buffer is handed over verbatim: no compression, no byte swapping.
//! Encoding clones a reference-counted handle, so it never copies the array
//! and never needs a lock; the TensorValue it reads cannot change.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::dtype::ElementType;
use crate::error::ArrayError;
use crate::shape::Shape;
use crate::tensor::TensorValue;

/// Wire-level record of one array snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Row-major bytes, native byte order.
    pub buffer: Bytes,
    /// Dimension sizes; empty for a scalar.
    pub shape: Shape,
    pub dtype: ElementType,
}

impl Envelope {
    /// Assemble an envelope from raw wire parts, resolving the dtype tag.
    ///
    /// Only the tag is checked here; shape/buffer consistency is checked by
    /// `decode`.
    pub fn from_parts(buffer: Bytes, shape: &[u64], dtype: &str) -> Result<Self, ArrayError> {
        let dtype: ElementType = dtype.parse()?;
        let dims = shape
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<usize>, _>>()
            .map_err(|_| ArrayError::ShapeBufferMismatch {
                shape: shape
                    .iter()
                    .map(|&d| usize::try_from(d).unwrap_or(usize::MAX))
                    .collect(),
                dtype,
                expected: None,
                actual: buffer.len(),
            })?;
        Ok(Self {
            buffer,
            shape: Shape::new(dims),
            dtype,
        })
    }

    /// Dimension sizes widened for the wire.
    pub fn wire_shape(&self) -> Vec<u64> {
        self.shape.dims().iter().map(|&d| d as u64).collect()
    }
}

/// Encode a tensor into a fresh envelope. Never fails for a constructed
/// TensorValue.
pub fn encode(tensor: &TensorValue) -> Envelope {
    Envelope {
        buffer: tensor.buffer().clone(),
        shape: tensor.shape().clone(),
        dtype: tensor.dtype(),
    }
}

/// Encode the value currently held by a holder; absence is a precondition
/// violation, not an empty envelope.
pub fn encode_current(tensor: Option<&TensorValue>) -> Result<Envelope, ArrayError> {
    tensor.map(encode).ok_or(ArrayError::NoValueSet)
}

/// Rebuild a TensorValue from a received envelope.
///
/// Goes through `TensorValue::new`, so an envelope whose buffer disagrees
/// with its shape fails with `ShapeBufferMismatch`.
pub fn decode(envelope: &Envelope) -> Result<TensorValue, ArrayError> {
    TensorValue::new(
        envelope.shape.clone(),
        envelope.dtype,
        envelope.buffer.clone(),
    )
}

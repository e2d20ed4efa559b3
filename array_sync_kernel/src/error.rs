//! Kernel error taxonomy.
//!
//! Every variant is a programmer or data error. Nothing here is recovered
//! internally; callers get the error from the operation that found it.

use thiserror::Error;

use crate::dtype::ElementType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// Element type tag outside the closed registry.
    #[error("unknown element type: {0:?}")]
    UnknownElementType(String),

    /// Buffer length disagrees with product(shape) * width(dtype).
    #[error(
        "shape {shape:?} with dtype {dtype} needs {expected:?} bytes, buffer has {actual}"
    )]
    ShapeBufferMismatch {
        shape: Vec<usize>,
        dtype: ElementType,
        /// `None` when the element count overflows `usize`.
        expected: Option<usize>,
        actual: usize,
    },

    /// Encode requested while no value is installed.
    #[error("no array value has been set")]
    NoValueSet,

    #[error("flat index {index} out of bounds for {len} elements")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("element type mismatch: array holds {expected}, got {actual}")]
    ElementTypeMismatch {
        expected: ElementType,
        actual: ElementType,
    },

    #[error("segment {start}..{stop} out of range for {len} elements")]
    SegmentOutOfRange { start: usize, stop: usize, len: usize },
}

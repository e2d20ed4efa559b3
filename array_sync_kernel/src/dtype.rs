//! Element Type Registry — the closed set of scalar kinds an array may hold.
//!
//! Immutable lookup table. The lowercase tag is part of the wire contract:
//! front ends select their typed-array constructor from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArrayError;

/// Scalar element kind of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
    Bool,
}

impl ElementType {
    /// Every registered kind, in registry order.
    pub const ALL: [ElementType; 12] = [
        ElementType::Int8,
        ElementType::Uint8,
        ElementType::Int16,
        ElementType::Uint16,
        ElementType::Int32,
        ElementType::Uint32,
        ElementType::Int64,
        ElementType::Uint64,
        ElementType::Float16,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Bool,
    ];

    /// Size in bytes of a single element.
    pub const fn width(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Bool => 1,
            ElementType::Int16 | ElementType::Uint16 | ElementType::Float16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::Uint64 | ElementType::Float64 => 8,
        }
    }

    /// Wire tag, e.g. `"int32"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            ElementType::Int8 => "int8",
            ElementType::Uint8 => "uint8",
            ElementType::Int16 => "int16",
            ElementType::Uint16 => "uint16",
            ElementType::Int32 => "int32",
            ElementType::Uint32 => "uint32",
            ElementType::Int64 => "int64",
            ElementType::Uint64 => "uint64",
            ElementType::Float16 => "float16",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Bool => "bool",
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(
            self,
            ElementType::Float16 | ElementType::Float32 | ElementType::Float64
        )
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = ArrayError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        // Front ends name clamped bytes separately; the storage is identical.
        if tag == "uint8_clamped" {
            return Ok(ElementType::Uint8);
        }
        ElementType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| ArrayError::UnknownElementType(tag.to_string()))
    }
}

/// Width in bytes of the element type named by `tag`.
pub fn width_of(tag: &str) -> Result<usize, ArrayError> {
    tag.parse::<ElementType>().map(ElementType::width)
}

#![forbid(unsafe_code)]

//! Array sync kernel — the data half of the array synchronization protocol.
//!
//! Element types, immutable tensor values, and the three-field binary
//! envelope {buffer, shape, dtype} that travels to the remote consumer.
//!
//! Pure layer. No I/O, no locks, no sessions. Those live in the runtime.

/// Wire format revision of the envelope. Bumping it is a breaking change
/// for every front end that decodes envelopes.
pub const WIRE_FORMAT_VERSION: u32 = 1;

pub mod dtype;
pub mod envelope;
pub mod error;
pub mod hashing;
pub mod shape;
pub mod tensor;

pub use dtype::{width_of, ElementType};
pub use envelope::{decode, encode, encode_current, Envelope};
pub use error::ArrayError;
pub use shape::Shape;
pub use tensor::{Element, TensorValue};

#![forbid(unsafe_code)]

//! Array sync runtime — synchronized models on top of the kernel.
//!
//! Holds the single mutable cell of the protocol (a model's current value),
//! pushes envelopes through a `Session`, and records pushes in an
//! append-only binary log that a consumer can replay.
//!
//! No encoding rules live here; envelopes come from the kernel.

pub mod config;
pub mod error;
pub mod identity;
pub mod log_session;
pub mod model;
pub mod proto_bridge;
pub mod proto_types;
pub mod push;
pub mod push_log;
pub mod replay;
pub mod session;
pub mod union;

pub use config::SyncConfig;
pub use error::SyncError;
pub use identity::{ModelIdentity, NDARRAY_MODEL};
pub use model::{NdArrayModel, SyncValue, SynchronizedModel};
pub use push::{FieldValue, PushEvent, PushRecord, SegmentUpdate};
pub use session::{MemorySession, Session, SessionHandle};

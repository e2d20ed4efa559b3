//! Session — the channel a model pushes field updates through.
//!
//! The transport itself is external; this module defines the interface a
//! model needs and ships `MemorySession`, an in-process recording session.
//!
//! Concurrency: implementations are shared across threads (`Send + Sync`)
//! and serialize their own writes. A closed session fails every call with
//! `SessionUnavailable`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::info;

use crate::error::SyncError;
use crate::identity::ModelIdentity;
use crate::push::{FieldValue, PushEvent, PushRecord, SegmentUpdate};

/// Prefix a front end uses to recognise a reference to another model.
pub const MODEL_REF_PREFIX: &str = "IPY_MODEL_";

/// Logical channel opened for one model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle {
    comm_id: String,
}

impl SessionHandle {
    pub fn new(comm_id: impl Into<String>) -> Self {
        Self {
            comm_id: comm_id.into(),
        }
    }

    pub fn comm_id(&self) -> &str {
        &self.comm_id
    }

    /// Serialized reference to the model behind this channel.
    pub fn model_ref(&self) -> String {
        format!("{}{}", MODEL_REF_PREFIX, self.comm_id)
    }
}

/// The primitives a synchronized model needs from its transport.
pub trait Session: Send + Sync {
    /// Open a logical channel with the creation handshake state.
    fn open(
        &self,
        identity: &ModelIdentity,
        state: &Map<String, Value>,
    ) -> Result<SessionHandle, SyncError>;

    /// Push one named field update.
    fn push_field(
        &self,
        handle: &SessionHandle,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), SyncError>;

    /// Send a partial array update as a custom message with buffers.
    fn send_segments(
        &self,
        handle: &SessionHandle,
        update: &SegmentUpdate,
    ) -> Result<(), SyncError>;
}

/// In-process session that records every push in order.
#[derive(Default)]
pub struct MemorySession {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    closed: bool,
    next_comm: u64,
    records: Vec<PushRecord>,
}

impl MemoryInner {
    fn record(&mut self, comm_id: &str, event: PushEvent) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::session_unavailable("memory session closed"));
        }
        let sequence = self.records.len() as u64 + 1;
        self.records.push(PushRecord {
            sequence,
            comm_id: comm_id.to_string(),
            event,
        });
        Ok(())
    }
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnect. Later calls fail with `SessionUnavailable`.
    pub fn close(&self) {
        self.lock().closed = true;
        info!("memory session closed");
    }

    /// Reconnect after `close`. Recorded pushes are kept.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Every record so far, in push order.
    pub fn records(&self) -> Vec<PushRecord> {
        self.lock().records.clone()
    }

    /// Field updates only, as `(comm_id, field, value)`.
    pub fn field_pushes(&self) -> Vec<(String, String, FieldValue)> {
        self.lock()
            .records
            .iter()
            .filter_map(|r| match &r.event {
                PushEvent::Field { field, value } => {
                    Some((r.comm_id.clone(), field.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    // Records are append-only, so a panic elsewhere cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for MemorySession {
    fn open(
        &self,
        identity: &ModelIdentity,
        state: &Map<String, Value>,
    ) -> Result<SessionHandle, SyncError> {
        let mut inner = self.lock();
        let comm_id = format!("mem-{:04}", inner.next_comm);
        inner.record(&comm_id, PushEvent::opened(identity, state))?;
        inner.next_comm += 1;
        info!(comm_id = %comm_id, model = identity.model_name, "opened memory channel");
        Ok(SessionHandle::new(comm_id))
    }

    fn push_field(
        &self,
        handle: &SessionHandle,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), SyncError> {
        self.lock().record(
            handle.comm_id(),
            PushEvent::Field {
                field: field.to_string(),
                value: value.clone(),
            },
        )
    }

    fn send_segments(
        &self,
        handle: &SessionHandle,
        update: &SegmentUpdate,
    ) -> Result<(), SyncError> {
        self.lock()
            .record(handle.comm_id(), PushEvent::Segments(update.clone()))
    }
}

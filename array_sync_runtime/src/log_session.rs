//! Log-backed session — every push becomes a frame in a `PushLog`.
//!
//! Lets a consumer replay exactly what a model published. Write failures
//! surface as `SessionUnavailable`: the model's local state stands and the
//! caller decides whether to retry.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::identity::ModelIdentity;
use crate::push::{FieldValue, PushEvent, PushRecord, SegmentUpdate};
use crate::push_log::PushLog;
use crate::session::{Session, SessionHandle};

pub struct LogSession {
    inner: Mutex<LogInner>,
}

struct LogInner {
    log: PushLog,
    closed: bool,
}

impl LogInner {
    fn append(&mut self, comm_id: &str, event: PushEvent) -> Result<u64, SyncError> {
        if self.closed {
            return Err(SyncError::session_unavailable("log session closed"));
        }
        let record = PushRecord {
            sequence: self.log.last_sequence() + 1,
            comm_id: comm_id.to_string(),
            event,
        };
        self.log.append(&record).map_err(|e| {
            warn!(path = %self.log.path().display(), error = %e, "push log append failed");
            SyncError::session_unavailable(format!("push log append failed: {}", e))
        })?;
        Ok(record.sequence)
    }
}

impl LogSession {
    /// Open (or resume) the log at `path`.
    pub fn open_log(path: &Path, config: SyncConfig) -> Result<Self, SyncError> {
        let log = PushLog::open(path, config)?;
        Ok(Self {
            inner: Mutex::new(LogInner { log, closed: false }),
        })
    }

    pub fn close(&self) {
        self.lock().closed = true;
        info!("log session closed");
    }

    /// Every record written so far, decoded.
    pub fn load_all(&self) -> Result<Vec<PushRecord>, SyncError> {
        self.lock().log.load_all()
    }

    pub fn last_sequence(&self) -> u64 {
        self.lock().log.last_sequence()
    }

    // The log only advances after a complete frame, so poisoning is harmless.
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for LogSession {
    fn open(
        &self,
        identity: &ModelIdentity,
        state: &Map<String, Value>,
    ) -> Result<SessionHandle, SyncError> {
        let mut inner = self.lock();
        // Channel ids derive from the handshake's sequence, so they stay
        // unique when a log is resumed.
        let comm_id = format!("log-{:06}", inner.log.last_sequence() + 1);
        inner.append(&comm_id, PushEvent::opened(identity, state))?;
        info!(comm_id = %comm_id, model = identity.model_name, "opened log channel");
        Ok(SessionHandle::new(comm_id))
    }

    fn push_field(
        &self,
        handle: &SessionHandle,
        field: &str,
        value: &FieldValue,
    ) -> Result<(), SyncError> {
        self.lock()
            .append(
                handle.comm_id(),
                PushEvent::Field {
                    field: field.to_string(),
                    value: value.clone(),
                },
            )
            .map(|_| ())
    }

    fn send_segments(
        &self,
        handle: &SessionHandle,
        update: &SegmentUpdate,
    ) -> Result<(), SyncError> {
        self.lock()
            .append(handle.comm_id(), PushEvent::Segments(update.clone()))
            .map(|_| ())
    }
}

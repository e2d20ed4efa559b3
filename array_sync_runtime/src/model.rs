//! Synchronized model — a named, versioned holder of one synced value plus
//! metadata fields, publishing every change through a `Session`.
//!
//! States: Uninitialized (no value) → Holding(value). Every `set` moves to
//! Holding(new) and pushes exactly one envelope; nothing is coalesced or
//! deduplicated.
//!
//! Concurrency:
//!   - `slot` (RwLock) is the only mutable shared cell. Readers take a short
//!     read lock and clone the value, which is cheap and never torn because
//!     published values are immutable.
//!   - `publish` (Mutex) is held across install + push, so push order always
//!     matches installation order and the last push carries the final value.
//!
//! Push failures never roll back: local state is authoritative and the
//! error goes back to the caller.

use std::collections::BTreeMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use array_sync_kernel::{encode, ArrayError, ElementType, Shape, TensorValue};

use crate::error::SyncError;
use crate::identity::{is_identity_key, ModelIdentity, NDARRAY_MODEL};
use crate::push::{FieldValue, SegmentUpdate};
use crate::session::{Session, SessionHandle};

/// A value kind a model can synchronize.
pub trait SyncValue: Clone + Send + Sync + 'static {
    /// Static model-kind metadata for the creation handshake.
    const IDENTITY: ModelIdentity;
    /// Name of the field the value is pushed under.
    const FIELD: &'static str;

    fn to_field(&self) -> FieldValue;
}

impl SyncValue for TensorValue {
    const IDENTITY: ModelIdentity = NDARRAY_MODEL;
    const FIELD: &'static str = "array";

    fn to_field(&self) -> FieldValue {
        FieldValue::Envelope(encode(self))
    }
}

/// Instance validator; `Err` carries the rejection reason.
pub type Validator<V> = Box<dyn Fn(&V) -> Result<(), String> + Send + Sync>;

struct Slot<V> {
    value: Option<V>,
    version: u64,
    fields: BTreeMap<String, FieldValue>,
}

pub struct SynchronizedModel<V: SyncValue> {
    session: Arc<dyn Session>,
    handle: SessionHandle,
    slot: RwLock<Slot<V>>,
    publish: Mutex<()>,
    validators: RwLock<Vec<Validator<V>>>,
}

/// The array widget model.
pub type NdArrayModel = SynchronizedModel<TensorValue>;

impl<V: SyncValue> SynchronizedModel<V> {
    /// Open a channel on `session` and start Uninitialized.
    pub fn open(session: Arc<dyn Session>) -> Result<Self, SyncError> {
        Self::open_with_metadata(session, Map::new())
    }

    /// Like `open`, with metadata fields sent in the creation handshake.
    pub fn open_with_metadata(
        session: Arc<dyn Session>,
        metadata: Map<String, Value>,
    ) -> Result<Self, SyncError> {
        let mut state = V::IDENTITY.state_fields();
        let mut fields = BTreeMap::new();
        for (name, value) in metadata {
            check_field_name::<V>(&name)?;
            state.insert(name.clone(), value.clone());
            fields.insert(name, FieldValue::Json(value));
        }

        let handle = session.open(&V::IDENTITY, &state)?;
        debug!(
            comm_id = handle.comm_id(),
            model = V::IDENTITY.model_name,
            "model opened"
        );

        Ok(Self {
            session,
            handle,
            slot: RwLock::new(Slot {
                value: None,
                version: 0,
                fields,
            }),
            publish: Mutex::new(()),
            validators: RwLock::new(Vec::new()),
        })
    }

    pub fn identity(&self) -> ModelIdentity {
        V::IDENTITY
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Current value, without side effects.
    pub fn get(&self) -> Option<V> {
        self.read_slot().value.clone()
    }

    /// Number of installations so far; 0 while Uninitialized.
    pub fn version(&self) -> u64 {
        self.read_slot().version
    }

    /// Validate, install and push `value`. Returns the new version.
    ///
    /// On `SessionUnavailable` the value is still installed.
    pub fn set(&self, value: V) -> Result<u64, SyncError> {
        self.validate(&value)?;
        let _publish = self.publish_guard();
        let field = value.to_field();
        let version = self.install(value);
        debug!(
            comm_id = self.handle.comm_id(),
            field = V::FIELD,
            version,
            "publishing value"
        );
        self.deliver(V::FIELD, &field)?;
        Ok(version)
    }

    /// Push the current value again, e.g. after the transport reconnected.
    pub fn resync(&self) -> Result<(), SyncError> {
        let _publish = self.publish_guard();
        let field = self
            .read_slot()
            .value
            .as_ref()
            .map(SyncValue::to_field)
            .ok_or(ArrayError::NoValueSet)?;
        self.deliver(V::FIELD, &field)
    }

    /// Store and push an extra named field.
    pub fn set_field(&self, name: &str, value: FieldValue) -> Result<(), SyncError> {
        check_field_name::<V>(name)?;
        let _publish = self.publish_guard();
        self.write_slot()
            .fields
            .insert(name.to_string(), value.clone());
        self.deliver(name, &value)
    }

    pub fn set_metadata(&self, name: &str, value: Value) -> Result<(), SyncError> {
        self.set_field(name, FieldValue::Json(value))
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.read_slot().fields.get(name).cloned()
    }

    /// JSON metadata field; `None` if absent or binary.
    pub fn metadata(&self, name: &str) -> Option<Value> {
        match self.field(name) {
            Some(FieldValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Register a check run against every value before installation.
    pub fn add_validator<F>(&self, validator: F)
    where
        F: Fn(&V) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(validator));
    }

    fn validate(&self, value: &V) -> Result<(), SyncError> {
        let validators = self
            .validators
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for validator in validators.iter() {
            validator(value).map_err(SyncError::ValidationFailed)?;
        }
        Ok(())
    }

    fn install(&self, value: V) -> u64 {
        let mut slot = self.write_slot();
        slot.value = Some(value);
        slot.version += 1;
        slot.version
    }

    fn deliver(&self, field: &str, value: &FieldValue) -> Result<(), SyncError> {
        self.session
            .push_field(&self.handle, field, value)
            .map_err(|e| {
                warn!(
                    comm_id = self.handle.comm_id(),
                    field,
                    error = %e,
                    "push not delivered; local state kept"
                );
                e
            })
    }

    // Values in the slot are immutable and swapped whole, so a poisoned
    // lock still guards a consistent slot.
    fn read_slot(&self) -> RwLockReadGuard<'_, Slot<V>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot<V>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_guard(&self) -> MutexGuard<'_, ()> {
        self.publish.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SynchronizedModel<TensorValue> {
    pub fn get_array(&self) -> Option<TensorValue> {
        self.get()
    }

    pub fn set_array(&self, value: TensorValue) -> Result<u64, SyncError> {
        self.set(value)
    }

    pub fn shape(&self) -> Option<Shape> {
        self.read_slot().value.as_ref().map(|t| t.shape().clone())
    }

    pub fn dtype(&self) -> Option<ElementType> {
        self.read_slot().value.as_ref().map(TensorValue::dtype)
    }

    /// Reject any array whose element type is not `dtype`.
    pub fn with_dtype_constraint(self, dtype: ElementType) -> Self {
        self.add_validator(move |t: &TensorValue| {
            if t.dtype() == dtype {
                Ok(())
            } else {
                Err(format!("expected dtype {}, got {}", dtype, t.dtype()))
            }
        });
        self
    }

    /// Reject any array whose shape does not fit `dims`. `None` matches any
    /// size in that position; the rank must match exactly.
    pub fn with_shape_constraint(self, dims: &[Option<usize>]) -> Self {
        let dims = dims.to_vec();
        self.add_validator(move |t: &TensorValue| check_shape(t.shape(), &dims));
        self
    }

    /// Install `value` and send only the given flat element ranges instead
    /// of the whole buffer.
    ///
    /// `value` must share shape and dtype with the current array. Keeping
    /// the remote copy in step with the ranges chosen is the caller's job.
    pub fn update_segments(
        &self,
        value: TensorValue,
        segments: &[(usize, usize)],
    ) -> Result<u64, SyncError> {
        self.validate(&value)?;
        let _publish = self.publish_guard();
        {
            let slot = self.read_slot();
            let current = slot.value.as_ref().ok_or(ArrayError::NoValueSet)?;
            if current.shape() != value.shape() || current.dtype() != value.dtype() {
                return Err(SyncError::ValidationFailed(format!(
                    "segment update needs {} {}, got {} {}",
                    current.dtype(),
                    current.shape(),
                    value.dtype(),
                    value.shape()
                )));
            }
        }

        let mut starts = Vec::with_capacity(segments.len());
        let mut buffers = Vec::with_capacity(segments.len());
        for &(start, stop) in segments {
            buffers.push(value.segment_bytes(start, stop)?);
            starts.push(start as u64);
        }
        let update = SegmentUpdate {
            field: <TensorValue as SyncValue>::FIELD.to_string(),
            starts,
            buffers,
        };

        let version = self.install(value);
        debug!(
            comm_id = self.handle.comm_id(),
            segments = segments.len(),
            version,
            "publishing segments"
        );
        self.session
            .send_segments(&self.handle, &update)
            .map_err(|e| {
                warn!(comm_id = self.handle.comm_id(), error = %e, "segments not delivered");
                e
            })?;
        Ok(version)
    }
}

/// Match `shape` against per-dimension constraints, `None` being a wildcard.
pub fn check_shape(shape: &Shape, dims: &[Option<usize>]) -> Result<(), String> {
    if shape.rank() != dims.len() {
        return Err(format!(
            "shape expected to have {} components, but got {}",
            dims.len(),
            shape
        ));
    }
    for (i, (&actual, expected)) in shape.dims().iter().zip(dims).enumerate() {
        if let Some(expected) = *expected {
            if actual != expected {
                return Err(format!(
                    "dimension {} is supposed to be size {}, but got {}",
                    i, expected, actual
                ));
            }
        }
    }
    Ok(())
}

fn check_field_name<V: SyncValue>(name: &str) -> Result<(), SyncError> {
    if name == V::FIELD || is_identity_key(name) {
        return Err(SyncError::ValidationFailed(format!(
            "field name {:?} is reserved",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;
    use serde_json::json;

    fn model() -> (Arc<MemorySession>, NdArrayModel) {
        let session = Arc::new(MemorySession::new());
        let model = NdArrayModel::open(session.clone()).unwrap();
        (session, model)
    }

    #[test]
    fn starts_uninitialized() {
        let (_, model) = model();
        assert!(model.get_array().is_none());
        assert_eq!(model.version(), 0);
        assert!(model.shape().is_none());
        assert!(model.dtype().is_none());
    }

    #[test]
    fn set_bumps_version_and_exposes_typed_accessors() {
        let (_, model) = model();
        let t = TensorValue::zeros([4, 3], ElementType::Float32).unwrap();
        assert_eq!(model.set_array(t.clone()).unwrap(), 1);
        assert_eq!(model.set_array(t).unwrap(), 2);
        assert_eq!(model.shape(), Some(Shape::from([4, 3])));
        assert_eq!(model.dtype(), Some(ElementType::Float32));
    }

    #[test]
    fn resync_without_value_is_no_value_set() {
        let (session, model) = model();
        match model.resync() {
            Err(SyncError::Array(ArrayError::NoValueSet)) => {}
            other => panic!("Expected NoValueSet, got: {:?}", other),
        }
        assert!(session.field_pushes().is_empty());
    }

    #[test]
    fn reserved_field_names_are_refused() {
        let (_, model) = model();
        assert!(matches!(
            model.set_metadata("array", json!(1)),
            Err(SyncError::ValidationFailed(_))
        ));
        assert!(matches!(
            model.set_metadata("_model_name", json!("x")),
            Err(SyncError::ValidationFailed(_))
        ));
    }

    #[test]
    fn metadata_round_trips_locally() {
        let (session, model) = model();
        model.set_metadata("compression_level", json!(0)).unwrap();
        assert_eq!(model.metadata("compression_level"), Some(json!(0)));
        assert_eq!(model.metadata("missing"), None);
        assert_eq!(session.field_pushes().len(), 1);
    }

    #[test]
    fn shape_constraint_checks_rank() {
        let (session, model) = model();
        let model = model.with_shape_constraint(&[None, Some(3)]);
        match model.set_array(TensorValue::zeros([3], ElementType::Uint8).unwrap()) {
            Err(SyncError::ValidationFailed(msg)) => assert!(msg.contains("2 components")),
            other => panic!("Expected ValidationFailed, got: {:?}", other),
        }
        assert!(model.get_array().is_none());
        assert!(session.field_pushes().is_empty());
    }

    #[test]
    fn shape_constraint_checks_fixed_dimension() {
        let (_, model) = model();
        let model = model.with_shape_constraint(&[None, Some(3)]);
        match model.set_array(TensorValue::zeros([4, 2], ElementType::Uint8).unwrap()) {
            Err(SyncError::ValidationFailed(msg)) => {
                assert!(msg.contains("dimension 1 is supposed to be size 3"))
            }
            other => panic!("Expected ValidationFailed, got: {:?}", other),
        }
    }

    #[test]
    fn shape_constraint_wildcard_accepts_any_size() {
        let (_, model) = model();
        let model = model.with_shape_constraint(&[None, Some(3)]);
        for rows in [0, 1, 7] {
            let t = TensorValue::zeros([rows, 3], ElementType::Float32).unwrap();
            assert!(model.set_array(t).is_ok());
        }
        assert_eq!(model.shape(), Some(Shape::from([7, 3])));
    }

    #[test]
    fn scalar_matches_empty_constraint() {
        assert!(check_shape(&Shape::scalar(), &[]).is_ok());
        assert!(check_shape(&Shape::from([1]), &[]).is_err());
    }

    #[test]
    fn handshake_carries_identity_and_metadata() {
        let session = Arc::new(MemorySession::new());
        let mut meta = Map::new();
        meta.insert("label".to_string(), json!("weights"));
        let model = NdArrayModel::open_with_metadata(session.clone(), meta).unwrap();
        assert_eq!(model.metadata("label"), Some(json!("weights")));
        assert_eq!(model.identity(), NDARRAY_MODEL);

        match &session.records()[0].event {
            crate::push::PushEvent::Opened {
                model_name, state, ..
            } => {
                assert_eq!(model_name, "NDArrayModel");
                assert_eq!(state["_model_module"], json!("jupyter-datawidgets"));
                assert_eq!(state["label"], json!("weights"));
            }
            other => panic!("Expected Opened, got: {:?}", other),
        }
    }
}

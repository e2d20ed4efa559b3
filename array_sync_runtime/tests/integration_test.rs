//! Integration tests for array_sync_runtime.
//!
//! Log-backed tests use temporary directories for isolation.

use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use array_sync_kernel::{encode, ArrayError, ElementType, TensorValue};
use array_sync_runtime::log_session::LogSession;
use array_sync_runtime::push_log::PushLog;
use array_sync_runtime::replay;
use array_sync_runtime::{
    FieldValue, MemorySession, NdArrayModel, PushEvent, SyncConfig, SyncError,
};

fn memory_model() -> (Arc<MemorySession>, NdArrayModel) {
    let session = Arc::new(MemorySession::new());
    let model = NdArrayModel::open(session.clone()).expect("open model");
    (session, model)
}

fn array_pushes(session: &MemorySession) -> Vec<FieldValue> {
    session
        .field_pushes()
        .into_iter()
        .filter(|(_, field, _)| field == "array")
        .map(|(_, _, value)| value)
        .collect()
}

// ─────────────────────────────────────────────────────────────
// Test 1: one set, one push, carrying encode(v)
// ─────────────────────────────────────────────────────────────

#[test]
fn set_array_pushes_exactly_its_envelope() {
    let (session, model) = memory_model();
    let v = TensorValue::from_elements([2, 2], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();

    model.set_array(v.clone()).expect("live session");

    let pushes = array_pushes(&session);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0], FieldValue::Envelope(encode(&v)));
    assert_eq!(model.get_array(), Some(v));
}

// ─────────────────────────────────────────────────────────────
// Test 2: identical values are not deduplicated
// ─────────────────────────────────────────────────────────────

#[test]
fn identical_sets_push_twice() {
    let (session, model) = memory_model();
    let v = TensorValue::zeros([3], ElementType::Uint8).unwrap();

    model.set_array(v.clone()).unwrap();
    model.set_array(v.clone()).unwrap();

    let pushes = array_pushes(&session);
    assert_eq!(pushes.len(), 2);
    assert_eq!(pushes[0], pushes[1]);
    assert_eq!(model.version(), 2);
}

// ─────────────────────────────────────────────────────────────
// Test 3: closed session: state updates, error surfaces
// ─────────────────────────────────────────────────────────────

#[test]
fn closed_session_keeps_local_state() {
    let (session, model) = memory_model();
    let v = TensorValue::zeros([2, 3], ElementType::Int32).unwrap();
    session.close();

    let err = model.set_array(v.clone()).unwrap_err();
    assert!(err.is_session_unavailable(), "got: {:?}", err);
    assert_eq!(model.get_array(), Some(v.clone()));
    assert_eq!(model.version(), 1);
    assert!(array_pushes(&session).is_empty());

    // Caller-driven retry once the transport is back.
    session.reopen();
    model.resync().expect("reconnected");
    assert_eq!(array_pushes(&session), vec![FieldValue::Envelope(encode(&v))]);
}

// ─────────────────────────────────────────────────────────────
// Test 4: the 2x3 int32 scenario end to end
// ─────────────────────────────────────────────────────────────

#[test]
fn edit_and_reset_produces_second_push() {
    let (session, model) = memory_model();
    let v1 = TensorValue::new([2, 3], ElementType::Int32, vec![0u8; 24]).unwrap();
    model.set_array(v1.clone()).unwrap();

    let v2 = v1.with_element(2, -1i32).unwrap();
    model.set_array(v2).unwrap();

    let pushes = array_pushes(&session);
    assert_eq!(pushes.len(), 2);
    let first = pushes[0].as_envelope().unwrap();
    let second = pushes[1].as_envelope().unwrap();
    assert_ne!(first.buffer, second.buffer);
    assert_eq!(first.shape, second.shape);
    assert_eq!(first.dtype, second.dtype);
    assert_eq!(first.buffer.len(), 24);
}

// ─────────────────────────────────────────────────────────────
// Test 5: validators gate installation
// ─────────────────────────────────────────────────────────────

#[test]
fn dtype_constraint_rejects_without_side_effects() {
    let session = Arc::new(MemorySession::new());
    let model = NdArrayModel::open(session.clone())
        .unwrap()
        .with_dtype_constraint(ElementType::Float64);

    let wrong = TensorValue::zeros([2], ElementType::Float32).unwrap();
    assert!(matches!(
        model.set_array(wrong),
        Err(SyncError::ValidationFailed(_))
    ));
    assert!(model.get_array().is_none());
    assert_eq!(model.version(), 0);
    assert!(array_pushes(&session).is_empty());

    model.add_validator(|t: &TensorValue| {
        if t.shape().rank() == 1 {
            Ok(())
        } else {
            Err("expected a vector".to_string())
        }
    });
    let matrix = TensorValue::zeros([2, 2], ElementType::Float64).unwrap();
    assert!(model.set_array(matrix).is_err());
    let vector = TensorValue::zeros([4], ElementType::Float64).unwrap();
    assert_eq!(model.set_array(vector).unwrap(), 1);
}

// ─────────────────────────────────────────────────────────────
// Test 6: segment sync sends only the ranges
// ─────────────────────────────────────────────────────────────

#[test]
fn segment_update_sends_ranges_only() {
    let (session, model) = memory_model();
    let v1 = TensorValue::from_elements([6], &[0i16, 1, 2, 3, 4, 5]).unwrap();
    model.set_array(v1.clone()).unwrap();

    let v2 = v1.with_element(1, 10i16).unwrap().with_element(4, 40i16).unwrap();
    let version = model.update_segments(v2.clone(), &[(1, 2), (4, 6)]).unwrap();
    assert_eq!(version, 2);
    assert_eq!(model.get_array(), Some(v2.clone()));

    let records = session.records();
    let update = match &records.last().unwrap().event {
        PushEvent::Segments(update) => update.clone(),
        other => panic!("Expected Segments, got: {:?}", other),
    };
    assert_eq!(update.field, "array");
    assert_eq!(update.starts, vec![1, 4]);
    assert_eq!(update.buffers[0].len(), 2);
    assert_eq!(update.buffers[1].len(), 4);
    // Only the initial full push; the segment update is not a field push.
    assert_eq!(array_pushes(&session).len(), 1);

    let mirror = replay::rebuild(&records).unwrap();
    let seen = mirror.model(model.handle().comm_id()).unwrap();
    assert_eq!(seen.array("array"), Some(&v2));
}

#[test]
fn segment_update_requires_matching_layout() {
    let (_, model) = memory_model();
    let v = TensorValue::zeros([4], ElementType::Int8).unwrap();
    assert!(matches!(
        model.update_segments(v.clone(), &[(0, 1)]),
        Err(SyncError::Array(ArrayError::NoValueSet))
    ));

    model.set_array(v.clone()).unwrap();
    let reshaped = TensorValue::zeros([2, 2], ElementType::Int8).unwrap();
    assert!(matches!(
        model.update_segments(reshaped, &[(0, 1)]),
        Err(SyncError::ValidationFailed(_))
    ));
    assert!(matches!(
        model.update_segments(v.clone(), &[(2, 9)]),
        Err(SyncError::Array(ArrayError::SegmentOutOfRange { .. }))
    ));
    assert_eq!(model.version(), 1);
}

// ─────────────────────────────────────────────────────────────
// Test 7: racing setters leave a consistent final state
// ─────────────────────────────────────────────────────────────

#[test]
fn concurrent_sets_end_on_last_push() {
    let session = Arc::new(MemorySession::new());
    let model = Arc::new(NdArrayModel::open(session.clone()).unwrap());
    let threads = 8;
    let per_thread = 25;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let model = Arc::clone(&model);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let marker = (t * per_thread + i) as i64;
                    let v = TensorValue::from_elements([2], &[marker, -marker]).unwrap();
                    model.set_array(v).unwrap();
                    let seen = model.get_array().expect("value installed");
                    // Never torn: the pair always belongs together.
                    assert_eq!(seen.get::<i64>(0).unwrap(), -seen.get::<i64>(1).unwrap());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("setter thread panicked");
    }

    let pushes = array_pushes(&session);
    assert_eq!(pushes.len(), threads * per_thread);
    assert_eq!(model.version(), (threads * per_thread) as u64);
    let last = pushes.last().unwrap().as_envelope().unwrap().clone();
    assert_eq!(encode(&model.get_array().unwrap()), last);
}

#[test]
fn sequential_sets_push_in_order() {
    let (session, model) = memory_model();
    let values: Vec<TensorValue> = (0..5u32)
        .map(|i| TensorValue::from_elements([1], &[i]).unwrap())
        .collect();
    for v in &values {
        model.set_array(v.clone()).unwrap();
    }
    let expected: Vec<FieldValue> = values
        .iter()
        .map(|v| FieldValue::Envelope(encode(v)))
        .collect();
    assert_eq!(array_pushes(&session), expected);
}

// ─────────────────────────────────────────────────────────────
// Test 8: log session replays to the same consumer view
// ─────────────────────────────────────────────────────────────

#[test]
fn log_session_replay_matches_model() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("session").join("pushes.log");
    let session = Arc::new(LogSession::open_log(&path, SyncConfig::default()).expect("open log"));

    let model = NdArrayModel::open(session.clone()).unwrap();
    model.set_metadata("label", json!("weights")).unwrap();
    let v1 = TensorValue::zeros([3, 2], ElementType::Float64).unwrap();
    model.set_array(v1.clone()).unwrap();
    let v2 = v1.with_element(5, 2.5f64).unwrap();
    model.update_segments(v2.clone(), &[(5, 6)]).unwrap();

    let log = PushLog::open(&path, SyncConfig::default()).expect("reopen log");
    assert_eq!(log.last_sequence(), 4);
    let mirror = replay::rebuild_from_log(&log).expect("replay");
    let seen = mirror.model(model.handle().comm_id()).expect("model mirrored");
    assert_eq!(seen.model_name, "NDArrayModel");
    assert_eq!(seen.model_module_version, "~4.0.0");
    assert_eq!(seen.json("label"), Some(&json!("weights")));
    assert_eq!(seen.array("array"), Some(&v2));
}

#[test]
fn truncated_log_is_detected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("pushes.log");
    {
        let session = Arc::new(LogSession::open_log(&path, SyncConfig::default()).unwrap());
        let model = NdArrayModel::open(session).unwrap();
        model
            .set_array(TensorValue::zeros([16], ElementType::Float32).unwrap())
            .unwrap();
    }

    let data = std::fs::read(&path).unwrap();
    std::fs::write(&path, &data[..data.len() - 10]).unwrap();

    // Either open fails, or loading does.
    match PushLog::open(&path, SyncConfig::default()) {
        Ok(log) => assert!(log.load_all().is_err()),
        Err(SyncError::Decode(_)) => {}
        Err(other) => panic!("Expected Decode error, got: {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────
// Test 9: a torn length prefix stops the log from reopening
// ─────────────────────────────────────────────────────────────

#[test]
fn torn_prefix_blocks_further_pushes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("pushes.log");
    {
        let session = Arc::new(LogSession::open_log(&path, SyncConfig::default()).unwrap());
        let model = NdArrayModel::open(session).unwrap();
        model
            .set_array(TensorValue::zeros([4], ElementType::Int16).unwrap())
            .unwrap();
    }

    let mut data = std::fs::read(&path).unwrap();
    data.extend_from_slice(&[7, 0]);
    std::fs::write(&path, &data).unwrap();

    match LogSession::open_log(&path, SyncConfig::default()) {
        Err(SyncError::Decode(msg)) => assert!(msg.contains("length prefix")),
        Err(other) => panic!("Expected Decode error, got: {:?}", other),
        Ok(_) => panic!("log with a torn tail was reopened"),
    }
    // The stray bytes are left for the operator; nothing was appended after them.
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

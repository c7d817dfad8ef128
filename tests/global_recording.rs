//! Process-wide entry point. The global is shared by every test in this
//! binary, so the tests take a lock to run one at a time.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use engine_statsd::metrics::buffer::local_bucket_count;
use engine_statsd::metrics::names;
use engine_statsd::recorder::{self, Recorder};
use engine_statsd::statsd::{Emitter, SendOutcome};
use engine_statsd::{
    record_metric, record_vision_encoding_time, time_scope, MetricValue, SnapshotValue, StatsdConfig,
    StatsdStatLogger,
};

static SERIAL: Mutex<()> = parking_lot::const_mutex(());

/// Accepts every batch and sends nothing.
struct NullEmitter;

impl Emitter for NullEmitter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn send(&self, _lines: &[String]) -> SendOutcome {
        SendOutcome::default()
    }
}

#[test]
fn inactive_entry_point_is_a_no_op() {
    let _serial = SERIAL.lock();
    assert!(!recorder::is_active());

    thread::spawn(|| {
        record_metric(names::VISION_ENCODING, MetricValue::Timer(Duration::from_millis(3)));
        record_metric(names::PROMPT_TOKENS, MetricValue::Counter(1.0));
        record_vision_encoding_time(Duration::from_millis(1));
        drop(time_scope(names::VISION_ENCODING));

        // No bucket was ever created on this thread
        assert_eq!(local_bucket_count(), 0);
    })
    .join()
    .unwrap();

    assert!(recorder::installed().is_none());
}

#[test]
fn installed_recorder_collects_from_any_thread() {
    let _serial = SERIAL.lock();
    let rec = Arc::new(Recorder::new());
    recorder::install(Arc::clone(&rec)).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                record_vision_encoding_time(Duration::from_millis(10 + i));
                let _t = time_scope(names::VISION_ENCODING);
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    record_metric(names::NUM_REQUESTS_RUNNING, MetricValue::Gauge(5.0));

    let snap = rec.snapshot();
    match snap.get(names::VISION_ENCODING) {
        Some(SnapshotValue::Timer { observations }) => assert_eq!(observations.len(), 8),
        other => panic!("expected timer, got {other:?}"),
    }
    assert_eq!(
        snap.get(names::NUM_REQUESTS_RUNNING),
        Some(&SnapshotValue::Gauge { value: 5.0 })
    );

    let removed = recorder::uninstall().expect("recorder was installed");
    assert!(Arc::ptr_eq(&removed, &rec));
    assert!(!recorder::is_active());
}

#[test]
fn second_install_is_rejected() {
    let _serial = SERIAL.lock();
    recorder::install(Arc::new(Recorder::new())).unwrap();
    assert!(recorder::install(Arc::new(Recorder::new())).is_err());
    recorder::uninstall();

    // Fresh lifecycle after teardown
    recorder::install(Arc::new(Recorder::new())).unwrap();
    recorder::uninstall();
}

#[test]
fn cancelled_scope_records_nothing() {
    let _serial = SERIAL.lock();
    let rec = Arc::new(Recorder::new());
    recorder::install(Arc::clone(&rec)).unwrap();

    time_scope(names::VISION_ENCODING).cancel();
    assert!(rec.snapshot().get(names::VISION_ENCODING).is_none());

    recorder::uninstall();
}

#[test]
fn dropping_the_logger_uninstalls_its_recorder() {
    let _serial = SERIAL.lock();
    let logger =
        StatsdStatLogger::with_emitter(&StatsdConfig::new("localhost"), vec![0], Box::new(NullEmitter))
            .unwrap();
    logger.install_global().unwrap();
    assert!(recorder::is_active());
    assert!(Arc::ptr_eq(&recorder::installed().unwrap(), &logger.recorder()));

    drop(logger);
    assert!(!recorder::is_active());
    assert!(recorder::installed().is_none());

    thread::spawn(|| {
        record_vision_encoding_time(Duration::from_millis(2));
        assert_eq!(local_bucket_count(), 0);
    })
    .join()
    .unwrap();
}

#[test]
fn unrelated_logger_leaves_installed_recorder_alone() {
    let _serial = SERIAL.lock();
    let rec = Arc::new(Recorder::new());
    recorder::install(Arc::clone(&rec)).unwrap();

    let other =
        StatsdStatLogger::with_emitter(&StatsdConfig::new("localhost"), vec![0], Box::new(NullEmitter))
            .unwrap();
    drop(other);
    assert!(!recorder::uninstall_if(&Arc::new(Recorder::new())));
    assert!(recorder::is_active());

    assert!(recorder::uninstall_if(&rec));
    assert!(!recorder::is_active());
}

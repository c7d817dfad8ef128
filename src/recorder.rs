//! Producer-facing side of the pipeline.
//!
//! Engine code holds a [`Recorder`] directly; code far from the engine
//! (model forward passes, worker threads) goes through [`record_metric`],
//! which finds the process-wide recorder if one is installed and does
//! nothing otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{Result, StatsdError};
use crate::metrics::{names, MetricRegistry, MetricValue, Sample, SampleBuffers, Snapshot};

// ─── Recorder ────────────────────────────────────────────────────

/// Registry plus the per-thread buffers that feed it.
pub struct Recorder {
    registry: MetricRegistry,
    buffers: SampleBuffers,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            registry: MetricRegistry::new(),
            buffers: SampleBuffers::new(),
        }
    }

    /// Timers go to the calling thread's buffer; gauges and counters go
    /// straight to the registry.
    pub fn record(&self, name: &str, value: MetricValue) {
        match value {
            MetricValue::Timer(elapsed) => self.buffers.record(Sample::new(name, elapsed)),
            other => self.registry.record(name, other),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn buffers(&self) -> &SampleBuffers {
        &self.buffers
    }

    /// Drain every buffer, then build the snapshot. Samples recorded after
    /// the drain wait for the next call.
    pub fn snapshot(&self) -> Snapshot {
        let drained = self.buffers.drain_all();
        self.registry.snapshot(drained)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Process-wide instance ───────────────────────────────────────

/// Fast path for the inactive case: one relaxed load, no lock.
static ACTIVE: AtomicBool = AtomicBool::new(false);
static GLOBAL: RwLock<Option<Arc<Recorder>>> = parking_lot::const_rwlock(None);

/// Make `recorder` the target of [`record_metric`]. Fails if another
/// recorder is already installed.
///
/// Whoever installs a recorder must also drain it; once nothing reports,
/// timer samples pile up in the thread buckets. Prefer
/// `StatsdStatLogger::install_global`, which ties the installation to the
/// logger's lifetime.
pub fn install(recorder: Arc<Recorder>) -> Result<()> {
    let mut global = GLOBAL.write();
    if global.is_some() {
        return Err(StatsdError::Config("a metrics recorder is already installed".into()));
    }
    *global = Some(recorder);
    ACTIVE.store(true, Ordering::Release);
    Ok(())
}

/// Remove the installed recorder, returning it. Producers fall back to
/// no-ops immediately.
pub fn uninstall() -> Option<Arc<Recorder>> {
    let mut global = GLOBAL.write();
    ACTIVE.store(false, Ordering::Release);
    global.take()
}

/// Remove `recorder` only if it is the one installed. Returns whether it was.
pub fn uninstall_if(recorder: &Arc<Recorder>) -> bool {
    let mut global = GLOBAL.write();
    match global.as_ref() {
        Some(current) if Arc::ptr_eq(current, recorder) => {
            ACTIVE.store(false, Ordering::Release);
            *global = None;
            true
        }
        _ => false,
    }
}

pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Relaxed)
}

pub fn installed() -> Option<Arc<Recorder>> {
    if !is_active() {
        return None;
    }
    GLOBAL.read().clone()
}

/// Record a typed sample from anywhere. No-op when no recorder is
/// installed: no allocation, no thread-local state.
pub fn record_metric(name: &str, value: MetricValue) {
    if !is_active() {
        return;
    }
    if let Some(recorder) = GLOBAL.read().as_ref() {
        recorder.record(name, value);
    }
}

/// Vision encoder latency, measured on the worker that ran the encoder.
pub fn record_vision_encoding_time(elapsed: Duration) {
    record_metric(names::VISION_ENCODING, MetricValue::Timer(elapsed));
}

// ─── Scoped timing ───────────────────────────────────────────────

/// Records the time between its creation and drop as a timer sample.
/// Does not read the clock when the pipeline is inactive.
#[must_use = "the timer records when dropped"]
pub struct ScopedTimer {
    name: &'static str,
    start: Option<Instant>,
}

impl ScopedTimer {
    /// Stop early without recording.
    pub fn cancel(mut self) {
        self.start = None;
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(start) = self.start.take() {
            record_metric(self.name, MetricValue::Timer(start.elapsed()));
        }
    }
}

/// `let _t = time_scope("vision_encoding_seconds");`
pub fn time_scope(name: &'static str) -> ScopedTimer {
    ScopedTimer {
        name,
        start: is_active().then(Instant::now),
    }
}

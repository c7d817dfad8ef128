use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use super::snapshot::{Snapshot, SnapshotValue};
use super::{MetricKind, MetricValue, Sample};
use crate::error::{Result, StatsdError};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe metric registry.
/// The engine and request paths record into it, the reporting cycle calls
/// `snapshot()`.
pub struct MetricRegistry {
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    /// Kind each name was first registered with
    kinds: HashMap<String, MetricKind>,

    gauges: BTreeMap<String, f64>,
    counters: BTreeMap<String, CounterState>,
    /// Observations pending for the current cycle
    timers: BTreeMap<String, Vec<Duration>>,

    kind_conflicts: u64,
    /// Names already warned about, so a bad producer logs once
    conflicted: HashSet<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct CounterState {
    total: f64,
    reported: f64,
}

// ─── MetricRegistry impl ─────────────────────────────────────────

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Overwrite a gauge. Conflicts are logged and ignored.
    pub fn set_gauge(&self, name: &str, value: f64) {
        let _ = self.try_set_gauge(name, value);
    }

    /// Add to a counter. Conflicts and invalid deltas are logged and ignored.
    pub fn increment_counter(&self, name: &str, delta: f64) {
        let _ = self.try_increment_counter(name, delta);
    }

    /// Record one duration observation.
    pub fn observe_timer(&self, name: &str, elapsed: Duration) {
        let _ = self.try_observe_timer(name, elapsed);
    }

    /// Record a duration that arrives as float seconds, as engine stats do.
    /// Negative or non-finite values are dropped.
    pub fn observe_timer_secs(&self, name: &str, secs: f64) {
        match Duration::try_from_secs_f64(secs) {
            Ok(elapsed) => self.observe_timer(name, elapsed),
            Err(_) => tracing::debug!(metric = name, secs, "dropping invalid duration"),
        }
    }

    /// Dispatch on the tagged value.
    pub fn record(&self, name: &str, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => self.set_gauge(name, v),
            MetricValue::Counter(d) => self.increment_counter(name, d),
            MetricValue::Timer(e) => self.observe_timer(name, e),
        }
    }

    pub fn try_set_gauge(&self, name: &str, value: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.claim(name, MetricKind::Gauge)?;
        inner.gauges.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn try_increment_counter(&self, name: &str, delta: f64) -> Result<()> {
        if !delta.is_finite() || delta < 0.0 {
            tracing::warn!(metric = name, delta, "rejecting counter increment");
            return Err(StatsdError::InvalidValue {
                name: name.to_owned(),
                value: delta,
            });
        }
        let mut inner = self.inner.lock();
        inner.claim(name, MetricKind::Counter)?;
        inner.counters.entry(name.to_owned()).or_default().total += delta;
        Ok(())
    }

    pub fn try_observe_timer(&self, name: &str, elapsed: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.claim(name, MetricKind::Timer)?;
        inner.timers.entry(name.to_owned()).or_default().push(elapsed);
        Ok(())
    }

    /// Merge drained buffer samples, then produce this cycle's snapshot.
    ///
    /// Counters report the delta since the previous snapshot (zero-delta
    /// counters are left out); timer observations are moved out so each is
    /// reported once.
    pub fn snapshot(&self, drained: Vec<Sample>) -> Snapshot {
        for sample in drained {
            self.observe_timer(&sample.name, sample.elapsed);
        }
        self.inner.lock().snapshot()
    }

    // ── Read accessors ──────────────────────────────────────────

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.inner.lock().kinds.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.inner.lock().gauges.get(name).copied()
    }

    /// Cumulative counter value since creation.
    pub fn counter_total(&self, name: &str) -> Option<f64> {
        self.inner.lock().counters.get(name).map(|c| c.total)
    }

    /// Observations waiting for the next snapshot.
    pub fn pending_timer_observations(&self, name: &str) -> usize {
        self.inner.lock().timers.get(name).map_or(0, Vec::len)
    }

    /// Recordings rejected because of a kind mismatch.
    pub fn kind_conflicts(&self) -> u64 {
        self.inner.lock().kind_conflicts
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            gauges: BTreeMap::new(),
            counters: BTreeMap::new(),
            timers: BTreeMap::new(),
            kind_conflicts: 0,
            conflicted: HashSet::new(),
        }
    }

    /// Bind `name` to `kind` on first use; reject any other kind afterwards.
    fn claim(&mut self, name: &str, kind: MetricKind) -> Result<()> {
        let existing = match self.kinds.get(name) {
            Some(&existing) => existing,
            None => {
                self.kinds.insert(name.to_owned(), kind);
                return Ok(());
            }
        };
        if existing == kind {
            return Ok(());
        }

        self.kind_conflicts += 1;
        if self.conflicted.insert(name.to_owned()) {
            tracing::warn!(
                metric = name,
                %existing,
                requested = %kind,
                "metric recorded under a second kind, ignoring"
            );
        }
        Err(StatsdError::KindConflict {
            name: name.to_owned(),
            existing,
            requested: kind,
        })
    }

    fn snapshot(&mut self) -> Snapshot {
        let mut metrics = BTreeMap::new();

        for (name, &value) in &self.gauges {
            metrics.insert(name.clone(), SnapshotValue::Gauge { value });
        }

        for (name, state) in self.counters.iter_mut() {
            let delta = state.total - state.reported;
            state.reported = state.total;
            if delta > 0.0 {
                metrics.insert(
                    name.clone(),
                    SnapshotValue::Counter {
                        total: state.total,
                        delta,
                    },
                );
            }
        }

        for (name, observations) in self.timers.iter_mut() {
            if observations.is_empty() {
                continue;
            }
            // take() keeps the key but frees the vector for this cycle
            let observations = std::mem::take(observations);
            metrics.insert(name.clone(), SnapshotValue::Timer { observations });
        }

        Snapshot::new(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_conflict_keeps_existing_value() {
        let reg = MetricRegistry::new();
        reg.set_gauge("num_requests_running", 3.0);

        reg.increment_counter("num_requests_running", 5.0);
        reg.observe_timer("num_requests_running", Duration::from_millis(1));

        assert_eq!(reg.gauge("num_requests_running"), Some(3.0));
        assert_eq!(reg.kind_of("num_requests_running"), Some(MetricKind::Gauge));
        assert_eq!(reg.kind_conflicts(), 2);
        assert_eq!(reg.counter_total("num_requests_running"), None);
    }

    #[test]
    fn try_variant_reports_conflict() {
        let reg = MetricRegistry::new();
        reg.increment_counter("prompt_tokens", 1.0);
        let err = reg.try_set_gauge("prompt_tokens", 1.0).unwrap_err();
        assert!(matches!(
            err,
            StatsdError::KindConflict {
                existing: MetricKind::Counter,
                requested: MetricKind::Gauge,
                ..
            }
        ));
    }

    #[test]
    fn counters_report_deltas_once() {
        let reg = MetricRegistry::new();
        reg.increment_counter("prompt_tokens", 100.0);
        reg.increment_counter("prompt_tokens", 28.0);

        let first = reg.snapshot(Vec::new());
        assert_eq!(
            first.get("prompt_tokens"),
            Some(&SnapshotValue::Counter {
                total: 128.0,
                delta: 128.0
            })
        );

        // Nothing new: counter left out
        let second = reg.snapshot(Vec::new());
        assert!(second.get("prompt_tokens").is_none());

        reg.increment_counter("prompt_tokens", 2.0);
        let third = reg.snapshot(Vec::new());
        assert_eq!(
            third.get("prompt_tokens"),
            Some(&SnapshotValue::Counter {
                total: 130.0,
                delta: 2.0
            })
        );
    }

    #[test]
    fn invalid_counter_deltas_are_rejected() {
        let reg = MetricRegistry::new();
        reg.increment_counter("generation_tokens", 4.0);
        reg.increment_counter("generation_tokens", -1.0);
        reg.increment_counter("generation_tokens", f64::NAN);
        assert_eq!(reg.counter_total("generation_tokens"), Some(4.0));
    }

    #[test]
    fn gauges_persist_across_snapshots() {
        let reg = MetricRegistry::new();
        reg.set_gauge("kv_cache_usage_perc", 42.5);
        reg.snapshot(Vec::new());
        let snap = reg.snapshot(Vec::new());
        assert_eq!(
            snap.get("kv_cache_usage_perc"),
            Some(&SnapshotValue::Gauge { value: 42.5 })
        );
    }

    #[test]
    fn drained_samples_become_timer_observations() {
        let reg = MetricRegistry::new();
        reg.observe_timer_secs("e2e_request_latency_seconds", 0.25);
        reg.observe_timer_secs("e2e_request_latency_seconds", f64::NAN);
        reg.observe_timer_secs("e2e_request_latency_seconds", -1.0);

        let drained = vec![Sample::new("vision_encoding_seconds", Duration::from_millis(12))];
        let snap = reg.snapshot(drained);

        assert_eq!(
            snap.get("e2e_request_latency_seconds"),
            Some(&SnapshotValue::Timer {
                observations: vec![Duration::from_millis(250)]
            })
        );
        assert_eq!(
            snap.get("vision_encoding_seconds"),
            Some(&SnapshotValue::Timer {
                observations: vec![Duration::from_millis(12)]
            })
        );
        assert_eq!(reg.pending_timer_observations("vision_encoding_seconds"), 0);
        assert!(reg.snapshot(Vec::new()).get("vision_encoding_seconds").is_none());
    }

    #[test]
    fn drained_sample_with_conflicting_kind_is_ignored() {
        let reg = MetricRegistry::new();
        reg.set_gauge("vision_encoding_seconds", 1.0);
        let snap = reg.snapshot(vec![Sample::new(
            "vision_encoding_seconds",
            Duration::from_millis(3),
        )]);
        assert_eq!(
            snap.get("vision_encoding_seconds"),
            Some(&SnapshotValue::Gauge { value: 1.0 })
        );
    }

    #[test]
    fn concurrent_increments_are_each_reported_once() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        const THREADS: usize = 8;
        const INCREMENTS: usize = 5_000;

        let reg = MetricRegistry::new();
        let done = AtomicBool::new(false);

        let reported = thread::scope(|s| {
            let reporter = s.spawn(|| {
                let mut sum = 0.0;
                while !done.load(Ordering::Acquire) {
                    if let Some(SnapshotValue::Counter { delta, .. }) =
                        reg.snapshot(Vec::new()).get("prompt_tokens")
                    {
                        sum += delta;
                    }
                    thread::yield_now();
                }
                sum
            });

            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..INCREMENTS {
                            reg.increment_counter("prompt_tokens", 1.0);
                        }
                    })
                })
                .collect();
            for w in workers {
                w.join().unwrap();
            }
            done.store(true, Ordering::Release);
            reporter.join().unwrap()
        });

        let last = match reg.snapshot(Vec::new()).get("prompt_tokens") {
            Some(SnapshotValue::Counter { delta, .. }) => *delta,
            _ => 0.0,
        };
        assert_eq!(reported + last, (THREADS * INCREMENTS) as f64);
        assert_eq!(reg.counter_total("prompt_tokens"), Some((THREADS * INCREMENTS) as f64));
    }
}

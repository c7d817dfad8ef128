use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::percentiles::TimerSummary;
use super::MetricKind;

/// Aggregated value of one metric within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotValue {
    Gauge { value: f64 },
    /// `total` is cumulative since the registry was created, `delta` is
    /// what was added since the previous snapshot.
    Counter { total: f64, delta: f64 },
    /// Every observation made during the cycle.
    Timer { observations: Vec<Duration> },
}

impl SnapshotValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Counter { .. } => MetricKind::Counter,
            Self::Timer { .. } => MetricKind::Timer,
        }
    }
}

/// Point-in-time view shipped to the encoder once per reporting cycle.
/// Built fresh by the registry, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, SnapshotValue>,
}

impl Snapshot {
    pub fn new(metrics: BTreeMap<String, SnapshotValue>) -> Self {
        Self {
            taken_at: Utc::now(),
            metrics,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SnapshotValue> {
        self.metrics.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Local percentile view of every timer in this snapshot.
    pub fn timer_summaries(&self) -> BTreeMap<&str, TimerSummary> {
        self.metrics
            .iter()
            .filter_map(|(name, value)| match value {
                SnapshotValue::Timer { observations } => {
                    Some((name.as_str(), TimerSummary::from_observations(observations)))
                }
                _ => None,
            })
            .collect()
    }
}

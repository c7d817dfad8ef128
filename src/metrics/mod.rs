pub mod buffer;
pub mod names;
pub mod percentiles;
pub mod registry;
pub mod snapshot;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use buffer::SampleBuffers;
pub use registry::MetricRegistry;
pub use snapshot::{Snapshot, SnapshotValue};

/// The three metric shapes the collector understands.
/// A name is bound to exactly one kind for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
    Timer,
}

impl MetricKind {
    /// StatsD type tag for this kind.
    pub fn wire_type(self) -> &'static str {
        match self {
            Self::Gauge => "g",
            Self::Counter => "c",
            Self::Timer => "ms",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Timer => "timer",
        };
        f.write_str(s)
    }
}

/// A single typed measurement handed to the generic recording entry point.
/// The variant decides the kind the first time a name is seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Current value, overwritten on every report
    Gauge(f64),
    /// Increment, must be finite and non-negative
    Counter(f64),
    /// One duration observation
    Timer(Duration),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
            Self::Timer(_) => MetricKind::Timer,
        }
    }
}

/// A single timer observation recorded on a worker thread.
/// This is the "write" side: producers create these and push them into
/// their thread's bucket; the reporting cycle drains them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// e.g. "vision_encoding_seconds"
    pub name: String,
    /// Measured duration; converted to milliseconds only on the wire
    pub elapsed: Duration,
    /// Wall-clock time of the observation, when the producer cares
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn new(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            elapsed,
            timestamp: None,
        }
    }

    /// Same as [`Sample::new`] but stamped with the current time.
    pub fn stamped(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            elapsed,
            timestamp: Some(Utc::now()),
        }
    }
}

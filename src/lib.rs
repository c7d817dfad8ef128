//! StatsD metrics pipeline for an inference serving engine.
//!
//! Worker threads push timer samples into per-thread buffers, the engine
//! reports scheduler and iteration stats into a registry, and on every
//! stat-logging tick the [`StatsdStatLogger`] drains, snapshots, encodes and
//! ships everything to a StatsD collector over UDP. Nothing here can fail a
//! request: a bad cycle only loses that cycle's metrics.

pub mod config;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod recorder;
pub mod simulator;
pub mod stats;
pub mod statsd;

pub use config::StatsdConfig;
pub use error::{Result, StatsdError};
pub use logger::{CycleReport, CycleState, StatLogger, StatsdStatLogger};
pub use metrics::{MetricKind, MetricValue, Sample, Snapshot, SnapshotValue};
pub use recorder::{record_metric, record_vision_encoding_time, time_scope, Recorder, ScopedTimer};

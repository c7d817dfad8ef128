//! Error types for the StatsD pipeline.

use thiserror::Error;

use crate::metrics::MetricKind;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, StatsdError>;

/// Everything that can go wrong between a producer and the collector.
///
/// Only `Config` and `Io` ever reach a caller, and only at construction
/// time. `Resolve` is logged by the emitter, which keeps retrying. The
/// recording variants are logged and swallowed by the non-`try_` recording
/// API.
#[derive(Error, Debug)]
pub enum StatsdError {
    /// Bad host, port, prefix or limits
    #[error("configuration error: {0}")]
    Config(String),

    /// The collector host did not resolve to any address
    #[error("cannot resolve statsd host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket setup failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A name was recorded under a second kind
    #[error("metric '{name}' is a {existing}, cannot record it as a {requested}")]
    KindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    /// Value the kind cannot carry (negative counter delta, NaN duration...)
    #[error("invalid value {value} for metric '{name}'")]
    InvalidValue { name: String, value: f64 },
}

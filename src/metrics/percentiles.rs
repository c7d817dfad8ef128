use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Percentile breakdown of one timer's observations within a cycle.
/// Only used for the local cycle log line; the collector does its own
/// aggregation from the raw `|ms` lines.
#[derive(Debug, Clone, Serialize)]
pub struct TimerSummary {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub count: u64,
}

impl TimerSummary {
    /// Summarise a set of observations. Returns zeroed values if the slice
    /// is empty.
    pub fn from_observations(observations: &[Duration]) -> Self {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        else {
            return Self::empty();
        };

        for d in observations {
            // clamp to ≥ 1 μs and to the histogram ceiling
            let us = (d.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
            let _ = hist.record(us);
        }

        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.5),
            p99_us: hist.value_at_quantile(0.99),
            count: hist.len(),
        }
    }

    /// All-zero placeholder for a timer with no observations.
    pub fn empty() -> Self {
        Self {
            min_us: 0,
            max_us: 0,
            mean_us: 0.0,
            p50_us: 0,
            p99_us: 0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

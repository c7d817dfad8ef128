//! Stats handed over by the scheduler and engine core each step.
//!
//! Durations are float seconds, the way the engine measures them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups this step
    pub queries: u64,
    /// Lookups that hit
    pub hits: u64,
}

/// Scheduler state after one step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub num_running_reqs: u64,
    pub num_waiting_reqs: u64,
    /// Fraction of KV cache blocks in use (0.0 – 1.0)
    pub kv_cache_usage: f64,
    pub prefix_cache_stats: CacheStats,
    /// Present only when an external KV connector is configured
    pub connector_prefix_cache_stats: Option<CacheStats>,
}

/// Multi-modal processor cache activity.
pub type MultiModalCacheStats = CacheStats;

/// Timing breakdown of a request that finished this step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinishedRequestStats {
    pub finish_reason: String,
    pub e2e_latency: f64,
    pub queued_time: f64,
    pub prefill_time: f64,
    pub inference_time: f64,
    pub decode_time: f64,
}

/// Token throughput and latencies observed during one engine step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationStats {
    pub num_prompt_tokens: u64,
    pub num_generation_tokens: u64,
    pub num_preempted_reqs: u64,
    pub time_to_first_tokens_iter: Vec<f64>,
    pub inter_token_latencies_iter: Vec<f64>,
    pub finished_requests: Vec<FinishedRequestStats>,
}

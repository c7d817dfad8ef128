//! Fixed metric name catalogue.
//!
//! Timer names keep their `_seconds` suffix so dashboards line up with the
//! Prometheus exporter; the StatsD wire value is still milliseconds.

use std::fmt;

// ─── Gauges ──────────────────────────────────────────────────────

pub const NUM_REQUESTS_RUNNING: &str = "num_requests_running";
pub const NUM_REQUESTS_WAITING: &str = "num_requests_waiting";
pub const KV_CACHE_USAGE_PERC: &str = "kv_cache_usage_perc";

// ─── Counters ────────────────────────────────────────────────────

pub const PROMPT_TOKENS: &str = "prompt_tokens";
pub const GENERATION_TOKENS: &str = "generation_tokens";
pub const NUM_PREEMPTIONS: &str = "num_preemptions";
pub const PREFIX_CACHE_QUERIES: &str = "prefix_cache_queries";
pub const PREFIX_CACHE_HITS: &str = "prefix_cache_hits";
pub const EXTERNAL_PREFIX_CACHE_QUERIES: &str = "external_prefix_cache_queries";
pub const EXTERNAL_PREFIX_CACHE_HITS: &str = "external_prefix_cache_hits";
pub const MM_CACHE_QUERIES: &str = "mm_cache_queries";
pub const MM_CACHE_HITS: &str = "mm_cache_hits";
pub const REQUEST_SUCCESS: &str = "request_success";

// ─── Timers ──────────────────────────────────────────────────────

pub const TIME_TO_FIRST_TOKEN: &str = "time_to_first_token_seconds";
pub const INTER_TOKEN_LATENCY: &str = "inter_token_latency_seconds";
pub const VISION_ENCODING: &str = "vision_encoding_seconds";
pub const E2E_REQUEST_LATENCY: &str = "e2e_request_latency_seconds";
pub const REQUEST_QUEUE_TIME: &str = "request_queue_time_seconds";
pub const REQUEST_INFERENCE_TIME: &str = "request_inference_time_seconds";
pub const REQUEST_PREFILL_TIME: &str = "request_prefill_time_seconds";
pub const REQUEST_DECODE_TIME: &str = "request_decode_time_seconds";

// ─── Finish reasons ──────────────────────────────────────────────

/// Why a request stopped generating.
///
/// This is the only dynamic dimension on the wire, so it is a closed set:
/// anything the engine reports outside of it collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    Stop,
    Length,
    Abort,
    Error,
    Other,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Abort => "abort",
            Self::Error => "error",
            Self::Other => "other",
        }
    }

    /// Lenient parse of an engine-provided reason string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "abort" => Self::Abort,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `request_success.<reason>`
pub fn request_success(reason: FinishReason) -> String {
    format!("{REQUEST_SUCCESS}.{reason}")
}

//! Reporting cycle driver.
//!
//! The engine calls [`StatLogger::record`] after every step and
//! [`StatLogger::log`] on its periodic stat-logging tick. Each `log` is one
//! reporting cycle: drain buffers → snapshot → encode → send.

use std::sync::Arc;
use std::time::Instant;

use crate::config::StatsdConfig;
use crate::error::Result;
use crate::metrics::names::{self, FinishReason};
use crate::metrics::MetricRegistry;
use crate::recorder::{self, Recorder};
use crate::stats::{IterationStats, MultiModalCacheStats, SchedulerStats};
use crate::statsd::{Emitter, SendOutcome, StatsdEncoder, UdpEmitter};

/// Anything that consumes the engine's periodic stats.
pub trait StatLogger {
    /// Fold one step's stats into the logger's state.
    fn record(
        &mut self,
        scheduler_stats: Option<&SchedulerStats>,
        iteration_stats: Option<&IterationStats>,
        mm_cache_stats: Option<&MultiModalCacheStats>,
        engine_idx: usize,
    );

    /// Periodic tick, shared with the other loggers.
    fn log(&mut self);

    fn log_engine_initialized(&self) {}
}

/// Driver state. `Reporting` only exists for the duration of `log()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Reporting,
}

/// Result of one reporting cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub metrics: usize,
    pub lines: usize,
    pub send: SendOutcome,
}

// ─── StatsdStatLogger ────────────────────────────────────────────

pub struct StatsdStatLogger {
    engine_indexes: Vec<usize>,
    recorder: Arc<Recorder>,
    encoder: StatsdEncoder,
    emitter: Box<dyn Emitter>,
    state: CycleState,
    cycles: u64,
    last_report: CycleReport,
}

impl StatsdStatLogger {
    /// Build the logger only if the pipeline is configured. `Ok(None)`
    /// allocates nothing.
    pub fn from_config(config: Option<StatsdConfig>, engine_indexes: Vec<usize>) -> Result<Option<Self>> {
        config.map(|cfg| Self::new(&cfg, engine_indexes)).transpose()
    }

    /// UDP logger for a validated config.
    pub fn new(config: &StatsdConfig, engine_indexes: Vec<usize>) -> Result<Self> {
        let emitter = UdpEmitter::connect(config)?;
        Self::with_emitter(config, engine_indexes, Box::new(emitter))
    }

    /// Logger over any transport.
    pub fn with_emitter(
        config: &StatsdConfig,
        engine_indexes: Vec<usize>,
        emitter: Box<dyn Emitter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine_indexes,
            recorder: Arc::new(Recorder::new()),
            encoder: StatsdEncoder::new(config.prefix.clone()),
            emitter,
            state: CycleState::Idle,
            cycles: 0,
            last_report: CycleReport::default(),
        })
    }

    /// Shared recorder, for installing as the process-wide instance.
    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }

    /// Make this logger's recorder the process-wide one. It is uninstalled
    /// again when the logger drops, so nothing records into a recorder that
    /// is no longer drained.
    pub fn install_global(&self) -> Result<()> {
        recorder::install(self.recorder())
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn last_report(&self) -> CycleReport {
        self.last_report
    }

    /// One reporting cycle. Always returns to `Idle`, whatever the network
    /// does.
    pub fn report(&mut self) -> CycleReport {
        self.state = CycleState::Reporting;
        let started = Instant::now();

        let snapshot = self.recorder.snapshot();
        let lines = self.encoder.encode(&snapshot);
        let send = if lines.is_empty() {
            SendOutcome::default()
        } else {
            self.emitter.send(&lines)
        };

        let report = CycleReport {
            metrics: snapshot.len(),
            lines: lines.len(),
            send,
        };

        self.cycles += 1;
        self.last_report = report;
        self.state = CycleState::Idle;

        if tracing::enabled!(tracing::Level::DEBUG) {
            for (name, s) in snapshot.timer_summaries() {
                tracing::debug!(
                    metric = name,
                    count = s.count,
                    p50_us = s.p50_us,
                    p99_us = s.p99_us,
                    "timer summary"
                );
            }
        }
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(json) = serde_json::to_string(&snapshot) {
                tracing::trace!(snapshot = %json, "statsd snapshot");
            }
        }
        tracing::debug!(
            cycle = self.cycles,
            emitter = self.emitter.name(),
            metrics = report.metrics,
            lines = report.lines,
            payloads = send.payloads_sent,
            dropped = send.payloads_dropped,
            elapsed_us = started.elapsed().as_micros() as u64,
            "statsd cycle complete"
        );

        report
    }
}

impl StatLogger for StatsdStatLogger {
    fn record(
        &mut self,
        scheduler_stats: Option<&SchedulerStats>,
        iteration_stats: Option<&IterationStats>,
        mm_cache_stats: Option<&MultiModalCacheStats>,
        engine_idx: usize,
    ) {
        let reg = self.recorder.registry();
        tracing::trace!(engine_idx, "recording engine stats");

        if let Some(s) = scheduler_stats {
            record_scheduler(reg, s);
        }

        if let Some(mm) = mm_cache_stats {
            reg.increment_counter(names::MM_CACHE_QUERIES, mm.queries as f64);
            reg.increment_counter(names::MM_CACHE_HITS, mm.hits as f64);
        }

        if let Some(it) = iteration_stats {
            record_iteration(reg, it);
        }
    }

    fn log(&mut self) {
        self.report();
    }

    fn log_engine_initialized(&self) {
        tracing::info!(engines = ?self.engine_indexes, "statsd stat logger initialized");
    }
}

impl Drop for StatsdStatLogger {
    fn drop(&mut self) {
        if recorder::uninstall_if(&self.recorder) {
            tracing::debug!("statsd stat logger dropped, global recorder uninstalled");
        }
    }
}

// ─── Stats → registry mapping ────────────────────────────────────

fn record_scheduler(reg: &MetricRegistry, s: &SchedulerStats) {
    reg.set_gauge(names::NUM_REQUESTS_RUNNING, s.num_running_reqs as f64);
    reg.set_gauge(names::NUM_REQUESTS_WAITING, s.num_waiting_reqs as f64);
    reg.set_gauge(names::KV_CACHE_USAGE_PERC, s.kv_cache_usage * 100.0);

    reg.increment_counter(names::PREFIX_CACHE_QUERIES, s.prefix_cache_stats.queries as f64);
    reg.increment_counter(names::PREFIX_CACHE_HITS, s.prefix_cache_stats.hits as f64);

    if let Some(ext) = &s.connector_prefix_cache_stats {
        reg.increment_counter(names::EXTERNAL_PREFIX_CACHE_QUERIES, ext.queries as f64);
        reg.increment_counter(names::EXTERNAL_PREFIX_CACHE_HITS, ext.hits as f64);
    }
}

fn record_iteration(reg: &MetricRegistry, it: &IterationStats) {
    reg.increment_counter(names::NUM_PREEMPTIONS, it.num_preempted_reqs as f64);
    reg.increment_counter(names::PROMPT_TOKENS, it.num_prompt_tokens as f64);
    reg.increment_counter(names::GENERATION_TOKENS, it.num_generation_tokens as f64);

    for &ttft in &it.time_to_first_tokens_iter {
        reg.observe_timer_secs(names::TIME_TO_FIRST_TOKEN, ttft);
    }
    for &itl in &it.inter_token_latencies_iter {
        reg.observe_timer_secs(names::INTER_TOKEN_LATENCY, itl);
    }

    for req in &it.finished_requests {
        let reason = FinishReason::parse(&req.finish_reason);
        reg.increment_counter(&names::request_success(reason), 1.0);
        reg.observe_timer_secs(names::E2E_REQUEST_LATENCY, req.e2e_latency);
        reg.observe_timer_secs(names::REQUEST_QUEUE_TIME, req.queued_time);
        reg.observe_timer_secs(names::REQUEST_INFERENCE_TIME, req.inference_time);
        reg.observe_timer_secs(names::REQUEST_PREFILL_TIME, req.prefill_time);
        reg.observe_timer_secs(names::REQUEST_DECODE_TIME, req.decode_time);
    }
}

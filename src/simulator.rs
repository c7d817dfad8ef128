use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::logger::StatLogger;
use crate::metrics::names;
use crate::recorder::time_scope;
use crate::stats::{CacheStats, FinishedRequestStats, IterationStats, SchedulerStats};

// ─── Configuration ───────────────────────────────────────────────

/// Engine stat-logging period, in (float) seconds.
pub const ENV_LOG_STATS_INTERVAL: &str = "VLLM_LOG_STATS_INTERVAL";

/// Shape of the simulated engine.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// One engine step per tick
    pub step_interval: Duration,
    /// Periodic stat logging cadence
    pub log_interval: Duration,
    /// Threads running the simulated vision encoder
    pub vision_workers: u32,
    /// Scheduler batch limit
    pub max_running: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(50),
            log_interval: Duration::from_secs(10),
            vision_workers: 4,
            max_running: 32,
        }
    }
}

impl SimulationConfig {
    /// Defaults, with the logging cadence taken from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = std::env::var(ENV_LOG_STATS_INTERVAL)
            .ok()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|d| !d.is_zero())
        {
            config.log_interval = secs;
        }
        config
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Runs a fake engine until `running` is cleared.
///
/// Vision-encoder threads record through the process-wide entry point; the
/// engine loop feeds every logger each step and ticks them all on the same
/// logging cadence.
pub async fn run(
    running: Arc<AtomicBool>,
    mut loggers: Vec<Box<dyn StatLogger + Send>>,
    config: SimulationConfig,
) {
    let mut handles = Vec::with_capacity(config.vision_workers as usize);
    for worker_id in 0..config.vision_workers {
        let running = running.clone();
        handles.push(thread::spawn(move || vision_worker(worker_id, running)));
    }

    for logger in &loggers {
        logger.log_engine_initialized();
    }

    let mut rng = StdRng::seed_from_u64(42);
    let mut step = tokio::time::interval(config.step_interval);
    let mut last_log = Instant::now();

    while running.load(Ordering::Relaxed) {
        step.tick().await;

        let (sched, iter) = engine_step(&mut rng, config.max_running);
        let mm = CacheStats {
            queries: rng.gen_range(0..4),
            hits: rng.gen_range(0..2),
        };
        for logger in loggers.iter_mut() {
            logger.record(Some(&sched), Some(&iter), Some(&mm), 0);
        }

        if last_log.elapsed() >= config.log_interval {
            for logger in loggers.iter_mut() {
                logger.log();
            }
            last_log = Instant::now();
        }
    }

    // Wait for the encoder threads off the async runtime
    let _ = tokio::task::spawn_blocking(move || {
        for h in handles {
            let _ = h.join();
        }
    })
    .await;

    // Flush whatever the last partial interval collected
    for logger in loggers.iter_mut() {
        logger.log();
    }
}

// ─── Vision encoder worker ───────────────────────────────────────

fn vision_worker(id: u32, running: Arc<AtomicBool>) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) {
        let _timer = time_scope(names::VISION_ENCODING);
        thread::sleep(Duration::from_millis(rng.gen_range(5..40)));
    }
}

// ─── Engine step ─────────────────────────────────────────────────

fn engine_step(rng: &mut StdRng, max_running: u64) -> (SchedulerStats, IterationStats) {
    let running = rng.gen_range(0..=max_running);
    let queries = rng.gen_range(0..200u64);

    let sched = SchedulerStats {
        num_running_reqs: running,
        num_waiting_reqs: rng.gen_range(0..=4),
        kv_cache_usage: running as f64 / max_running.max(1) as f64 * 0.9,
        prefix_cache_stats: CacheStats {
            queries,
            hits: rng.gen_range(0..=queries),
        },
        connector_prefix_cache_stats: None,
    };

    let mut iter = IterationStats {
        num_generation_tokens: running,
        num_preempted_reqs: rng.gen_bool(0.02) as u64,
        inter_token_latencies_iter: (0..running.min(8))
            .map(|_| rng.gen_range(0.01..0.05))
            .collect(),
        ..Default::default()
    };

    // A new request got its first token this step
    if rng.gen_bool(0.3) {
        iter.num_prompt_tokens = rng.gen_range(16..2048);
        iter.time_to_first_tokens_iter.push(rng.gen_range(0.02..0.3));
    }

    if rng.gen_bool(0.2) {
        let reason = match rng.gen_range(0u8..10) {
            0..=6 => "stop",
            7..=8 => "length",
            _ => "abort",
        };
        let queued = rng.gen_range(0.0..0.5);
        let prefill = rng.gen_range(0.02..0.3);
        let decode = rng.gen_range(0.5..8.0);
        iter.finished_requests.push(FinishedRequestStats {
            finish_reason: reason.to_owned(),
            e2e_latency: queued + prefill + decode,
            queued_time: queued,
            prefill_time: prefill,
            inference_time: prefill + decode,
            decode_time: decode,
        });
    }

    (sched, iter)
}

// ─── Engine's own stat logger ────────────────────────────────────

/// Periodic throughput line, the engine's built-in logger that shares its
/// cadence with the StatsD one.
#[derive(Default)]
pub struct TracingStatLogger {
    prompt_tokens: u64,
    generation_tokens: u64,
    running: u64,
    waiting: u64,
    kv_cache_usage: f64,
    last_log: Option<Instant>,
}

impl StatLogger for TracingStatLogger {
    fn record(
        &mut self,
        scheduler_stats: Option<&SchedulerStats>,
        iteration_stats: Option<&IterationStats>,
        _mm_cache_stats: Option<&CacheStats>,
        _engine_idx: usize,
    ) {
        if let Some(s) = scheduler_stats {
            self.running = s.num_running_reqs;
            self.waiting = s.num_waiting_reqs;
            self.kv_cache_usage = s.kv_cache_usage;
        }
        if let Some(it) = iteration_stats {
            self.prompt_tokens += it.num_prompt_tokens;
            self.generation_tokens += it.num_generation_tokens;
        }
    }

    fn log(&mut self) {
        let now = Instant::now();
        let elapsed = self
            .last_log
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_log = Some(now);

        let (prompt_tps, gen_tps) = if elapsed > 0.0 {
            (
                self.prompt_tokens as f64 / elapsed,
                self.generation_tokens as f64 / elapsed,
            )
        } else {
            (0.0, 0.0)
        };

        tracing::info!(
            prompt_tokens_per_s = %format!("{prompt_tps:.1}"),
            generation_tokens_per_s = %format!("{gen_tps:.1}"),
            running = self.running,
            waiting = self.waiting,
            kv_cache_usage = %format!("{:.1}%", self.kv_cache_usage * 100.0),
            "engine stats"
        );

        self.prompt_tokens = 0;
        self.generation_tokens = 0;
    }
}

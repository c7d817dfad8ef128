use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use engine_statsd::logger::StatLogger;
use engine_statsd::simulator::{self, SimulationConfig, TracingStatLogger};
use engine_statsd::{recorder, StatsdConfig, StatsdStatLogger};

#[tokio::main]
async fn main() -> engine_statsd::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── 1. Activation ────────────────────────────────────────────
    let statsd_config = StatsdConfig::from_env()?;
    let sim_config = SimulationConfig::from_env();

    // ── 2. Build loggers ─────────────────────────────────────────
    let mut loggers: Vec<Box<dyn StatLogger + Send>> = vec![Box::new(TracingStatLogger::default())];

    match StatsdStatLogger::from_config(statsd_config, vec![0])? {
        Some(statsd) => {
            // Worker threads reach the pipeline through the global entry point
            statsd.install_global()?;
            loggers.push(Box::new(statsd));
        }
        None => {
            tracing::info!("VLLM_STATSD_HOST not set, statsd metrics disabled");
        }
    }

    // ── 3. Run the engine until ctrl-c ───────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let engine = tokio::spawn(simulator::run(running.clone(), loggers, sim_config.clone()));

    tracing::info!(
        log_interval_secs = sim_config.log_interval.as_secs_f64(),
        vision_workers = sim_config.vision_workers,
        "simulated engine running, press ctrl-c to stop"
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c, stopping");
    }
    running.store(false, Ordering::SeqCst);

    // ── 4. Teardown ──────────────────────────────────────────────
    if let Err(err) = engine.await {
        tracing::warn!(error = %err, "engine task ended abnormally");
    }
    // The statsd logger uninstalled its recorder when the engine dropped it
    debug_assert!(!recorder::is_active());

    Ok(())
}

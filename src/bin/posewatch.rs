//! posewatch - pose detection daemon
//!
//! This daemon:
//! 1. Loads the camera and detector configuration
//! 2. Starts one capture loop per camera, the inference worker and the
//!    annotation loop
//! 3. Logs telemetry periodically until Ctrl-C or a loop dies

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use posewatch::{Pipeline, PosewatchConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time pose detection over camera feeds")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "POSEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between telemetry log lines (0 disables them).
    #[arg(long, env = "POSEWATCH_STATS_INTERVAL", default_value_t = 30)]
    stats_interval: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PosewatchConfig::load_from(args.config.as_deref())?;
    log::info!(
        "posewatch {} starting: backend={}, cameras={:?}",
        env!("CARGO_PKG_VERSION"),
        config.detector.engine.kind.as_str(),
        config.cameras.keys().collect::<Vec<_>>()
    );

    let pipeline = Pipeline::start(&config)?;
    let shutdown = pipeline.shutdown_flag();
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let stats_interval = Duration::from_secs(args.stats_interval);
    let mut last_stats = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if let Some(name) = pipeline.finished_thread() {
            log::error!("{} thread ended, shutting down", name);
            break;
        }
        if !stats_interval.is_zero() && last_stats.elapsed() >= stats_interval {
            last_stats = Instant::now();
            match serde_json::to_string(&pipeline.telemetry().snapshot()) {
                Ok(json) => log::info!("telemetry {}", json),
                Err(e) => log::warn!("failed to encode telemetry: {}", e),
            }
        }
    }

    log::info!("shutdown requested, stopping pipeline...");
    pipeline.stop()
}

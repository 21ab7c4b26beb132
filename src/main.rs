//! uptrack - File-backed uptime monitoring pipeline.
//!
//! Probes configured endpoints on a cycle, appends readings to
//! day-partitioned archives, and maintains two derived files for the
//! rendering layer: a small hot-window file and a rolling daily summary.

mod config;
mod cycle;
mod maintenance;
mod probe;
mod store;

use config::MonitorConfig;
use cycle::{CycleError, LocalSync, WriteCoordinator};
use store::{ArchiveCompactor, StoreLayout};

use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = MonitorConfig::load()?;

    let default_level = if cfg.verbose { "uptrack=debug" } else { "uptrack=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse()?),
        )
        .init();

    // Bad configuration is fatal before any cycle begins
    let specs = config::load_endpoints(&cfg.endpoints_path)?;
    let mut windows = config::load_maintenance(&cfg.maintenance_path)?;
    tracing::info!(
        "Monitoring {} endpoints into {:?} (hot {}d, summary {}d)",
        specs.len(),
        cfg.data_dir,
        cfg.hot_window_days,
        cfg.summary_window_days
    );

    let layout = StoreLayout::new(&cfg.data_dir);
    let compactor = ArchiveCompactor::new(layout.clone());
    let mut coordinator = WriteCoordinator::new(
        layout,
        LocalSync,
        cfg.hot_window_days,
        cfg.summary_window_days,
    );

    if cfg.run_once {
        run_one_cycle(&mut coordinator, &specs, &windows).await?;
        let compressed = compactor.compress_closed_archives(chrono::Utc::now())?;
        if !compressed.is_empty() {
            tracing::info!("Compressed {} closed archives", compressed.len());
        }
        return Ok(());
    }

    // Single scheduler task: cycles can never overlap, so one cycle is
    // always exactly one writer against the shared store.
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.cycle_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let compress_every = Duration::from_secs(cfg.compress_interval_secs);
    let mut last_compress: Option<Instant> = None;

    loop {
        interval.tick().await;

        // Windows declared after startup must gate this cycle, not the
        // one after a restart
        windows = config::refresh_maintenance(&cfg.maintenance_path, windows);

        // A failed cycle leaves last-known-good files in place; the
        // next scheduled cycle proceeds normally.
        if let Err(e) = run_one_cycle(&mut coordinator, &specs, &windows).await {
            tracing::error!("Cycle aborted: {}", e);
        }

        if last_compress.map_or(true, |t| t.elapsed() >= compress_every) {
            match compactor.compress_closed_archives(chrono::Utc::now()) {
                Ok(paths) if !paths.is_empty() => {
                    tracing::info!("Compressed {} closed archives", paths.len())
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Archive compression failed: {}", e),
            }
            last_compress = Some(Instant::now());
        }
    }
}

/// Run one cycle and log its report. Exhausted commit retries count as
/// a completed-but-failed cycle (readings dropped), not a process
/// error; I/O and configuration problems propagate.
async fn run_one_cycle(
    coordinator: &mut WriteCoordinator<LocalSync>,
    specs: &[probe::EndpointSpec],
    windows: &[maintenance::MaintenanceWindow],
) -> Result<(), CycleError> {
    match coordinator.run_cycle(specs, windows).await {
        Ok(report) => {
            let down = report.down_transitions();
            if !down.is_empty() {
                tracing::warn!("Newly down this cycle: {:?}", down);
            }
            tracing::info!(
                "Cycle complete: {} services, {} commit attempt(s)",
                report.outcomes.len(),
                report.commit_attempts
            );
            Ok(())
        }
        Err(CycleError::RetriesExhausted(attempts)) => {
            tracing::error!(
                "Cycle failed: commit conflict persisted after {} attempts, readings dropped",
                attempts
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

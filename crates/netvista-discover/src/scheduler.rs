//! Periodic full-fleet scan scheduling.
//!
//! One loop, one tick per configured interval. Settings are re-read on
//! every tick, so operators can change cadence and probe parameters
//! without restarting the daemon. A tick that lands while the fleet is
//! still busy is skipped outright rather than queued, so a slow scan
//! cannot build a backlog of pending sweeps. Manual start requests bypass
//! the schedule entirely and only contend on the per-subnet claims.

use std::sync::Arc;

use tokio::time::{sleep, Duration};

use crate::config::DiscoverConfig;
use crate::coordinator::ScanCoordinator;
use crate::error::DiscoverError;

/// Re-reads settings for each tick. The daemon wires this to
/// `DiscoverConfig::load`; tests inject fixtures.
pub type SettingsSource = Box<dyn Fn() -> DiscoverConfig + Send + Sync>;

pub struct ScanScheduler {
    coordinator: Arc<ScanCoordinator>,
    settings: SettingsSource,
}

impl ScanScheduler {
    pub fn new(coordinator: Arc<ScanCoordinator>, settings: SettingsSource) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    /// Wire the scheduler to the config file the daemon was started
    /// with. Falls back to defaults when the file disappears.
    pub fn from_config_prefix(coordinator: Arc<ScanCoordinator>, prefix: &str) -> Self {
        let prefix = prefix.to_string();
        Self::new(
            coordinator,
            Box::new(move || DiscoverConfig::load(&prefix).unwrap_or_default()),
        )
    }

    /// Run the periodic loop. Never returns; the daemon aborts the
    /// task on shutdown.
    pub async fn run(&self) {
        tracing::info!("Scheduler started");
        loop {
            let config = (self.settings)();
            self.coordinator.update_config(config.clone()).await;

            let interval = Duration::from_secs(config.scan_interval_minutes.max(1) * 60);
            sleep(interval).await;
            self.tick().await;
        }
    }

    /// One scheduled sweep attempt.
    async fn tick(&self) {
        match self.coordinator.start_fleet_scan().await {
            Ok(job_id) => {
                tracing::info!(job_id = %job_id, "Scheduled fleet scan started");
            }
            Err(DiscoverError::AlreadyRunning { subnet, job }) => {
                tracing::info!(
                    blocked_on = %subnet,
                    running_job = %job,
                    "Previous scan still running, skipping tick"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled scan failed to start");
            }
        }
    }
}

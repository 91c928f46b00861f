//! CLI entry point for the netvista-discover scan daemon.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use netvista_core::events::ProgressEvent;
use netvista_core::types::Subnet;
use netvista_inventory::{InventoryStore, LogAlerts, MemoryInventory};

use netvista_discover::config::{DiscoverConfig, SubnetSeed};
use netvista_discover::coordinator::ScanCoordinator;
use netvista_discover::enumerate;
use netvista_discover::progress::ProgressBroadcaster;
use netvista_discover::registry::ScanRegistry;
use netvista_discover::scheduler::ScanScheduler;

#[derive(Parser)]
#[command(name = "netvista-discover")]
#[command(about = "Network discovery engine for the netvista IPAM")]
struct Cli {
    /// Extra CIDR to scan in addition to configured subnets
    /// (e.g., 10.0.1.0/24).
    #[arg(short, long)]
    target: Option<String>,

    /// Run a single full sweep and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled sweeps.
    #[arg(long)]
    daemon: bool,

    /// Config file prefix (default: netvista).
    #[arg(short, long, default_value = "netvista")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let discover_config = DiscoverConfig::load(&cli.config)?;

    let store = Arc::new(MemoryInventory::new());
    seed_subnets(&store, &discover_config.subnets).await;
    if let Some(target) = &cli.target {
        let cidr = enumerate::parse_cidr(target)?;
        store.add_subnet(Subnet::new(target, cidr)).await;
    }
    let subnet_count = store.list_subnets().await?.len();
    if subnet_count == 0 {
        anyhow::bail!("No subnets to scan: configure [[discover.subnets]] or pass --target");
    }
    tracing::info!(subnet_count, "Inventory seeded");

    let coordinator = Arc::new(ScanCoordinator::new(
        store,
        Arc::new(LogAlerts),
        Arc::new(ScanRegistry::new()),
        Arc::new(ProgressBroadcaster::new()),
        discover_config,
    ));
    spawn_progress_logger(&coordinator).await;

    if cli.once {
        let job_id = coordinator.start_fleet_scan().await?;
        let job = coordinator.wait_terminal(job_id).await?;
        tracing::info!(
            job_id = %job.id,
            status = ?job.status,
            probed = job.completed(),
            found = job.found(),
            "Sweep finished"
        );
    } else if cli.daemon {
        let scheduler = ScanScheduler::from_config_prefix(coordinator.clone(), &cli.config);
        tokio::select! {
            _ = scheduler.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }
    } else {
        anyhow::bail!("Specify --once (single sweep) or --daemon (scheduled scanning)");
    }

    Ok(())
}

/// Seed the in-memory inventory from config. A malformed CIDR skips
/// that subnet only; the rest of the fleet still scans.
async fn seed_subnets(store: &MemoryInventory, seeds: &[SubnetSeed]) {
    for seed in seeds {
        if !seed.enabled {
            tracing::info!(cidr = %seed.cidr, "Subnet disabled, skipping");
            continue;
        }
        let cidr = match enumerate::parse_cidr(&seed.cidr) {
            Ok(net) => net,
            Err(e) => {
                tracing::error!(cidr = %seed.cidr, error = %e, "Skipping unparseable subnet");
                continue;
            }
        };
        let name = seed.name.clone().unwrap_or_else(|| seed.cidr.clone());
        let mut subnet = Subnet::new(&name, cidr);
        subnet.gateway = seed.gateway;
        subnet.vlan = seed.vlan;
        subnet.assignment = seed.assignment;
        store.add_subnet(subnet).await;
    }
}

/// Mirror the progress channel into the log, the daemon's only UI.
async fn spawn_progress_logger(coordinator: &Arc<ScanCoordinator>) {
    let (replay, mut rx) = coordinator.broadcaster().subscribe().await;
    log_event(&replay);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Progress logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::JobStarted { job } => {
            tracing::info!(job_id = %job.id, targets = job.subnet_ids.len(), total = job.total(), "Scan started");
        }
        ProgressEvent::HostProbed {
            current,
            total,
            current_address,
            found,
            ..
        } => {
            tracing::debug!(current, total, address = %current_address, found, "Probed");
        }
        ProgressEvent::DeviceDiscovered {
            address, hostname, ..
        } => {
            tracing::info!(address = %address, hostname = ?hostname, "New device");
        }
        ProgressEvent::JobFinished { summary } => {
            tracing::info!(
                job_id = %summary.job_id,
                status = ?summary.status,
                online = summary.online_devices,
                subnets = summary.subnets_scanned,
                "Scan finished"
            );
        }
        ProgressEvent::Snapshot { job } => {
            tracing::info!(job_id = %job.id, completed = job.completed(), total = job.total(), "Scan in progress");
        }
        ProgressEvent::Idle => {
            tracing::debug!("No scan active");
        }
    }
}

//! Scan job lifecycle: validate, claim, drive, reconcile, summarize.
//!
//! One driver task per job pulls addresses lazily out of enumeration
//! and fans them across a bounded probe pool. Reconciliation and
//! counter updates happen on the driver task (single writer per job);
//! probing is the only highly parallel stage. Every exit path runs the
//! same terminal sequence, so the summary event fires exactly once per
//! job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;

use netvista_core::events::{AlertEvent, AlertKind, ProgressEvent, ScanPhase, ScanSummary};
use netvista_core::types::{
    ActivityKind, ActivityLogEntry, DeviceStatus, JobId, JobStatus, ProbeResult, ScanJob, Subnet,
    SubnetId, TargetProgress,
};
use netvista_inventory::{AlertSink, InventoryStore};

use crate::config::DiscoverConfig;
use crate::enumerate;
use crate::error::{DiscoverError, Result};
use crate::probe::{HostProber, NetProber};
use crate::progress::ProgressBroadcaster;
use crate::reconcile::ResultReconciler;
use crate::registry::{JobHandle, ScanRegistry};

/// Builds the prober a job will use, from the settings current at
/// start time. Swappable so tests can probe without a network.
pub type ProberFactory = Box<dyn Fn(&DiscoverConfig) -> Arc<dyn HostProber> + Send + Sync>;

pub struct ScanCoordinator {
    store: Arc<dyn InventoryStore>,
    alerts: Arc<dyn AlertSink>,
    registry: Arc<ScanRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    reconciler: Arc<ResultReconciler>,
    config: RwLock<DiscoverConfig>,
    prober_factory: ProberFactory,
}

impl ScanCoordinator {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        alerts: Arc<dyn AlertSink>,
        registry: Arc<ScanRegistry>,
        broadcaster: Arc<ProgressBroadcaster>,
        config: DiscoverConfig,
    ) -> Self {
        Self::with_prober_factory(
            store,
            alerts,
            registry,
            broadcaster,
            config,
            Box::new(|config| Arc::new(NetProber::new(config)) as Arc<dyn HostProber>),
        )
    }

    pub fn with_prober_factory(
        store: Arc<dyn InventoryStore>,
        alerts: Arc<dyn AlertSink>,
        registry: Arc<ScanRegistry>,
        broadcaster: Arc<ProgressBroadcaster>,
        config: DiscoverConfig,
        prober_factory: ProberFactory,
    ) -> Self {
        let reconciler = Arc::new(ResultReconciler::new(store.clone(), alerts.clone()));
        Self {
            store,
            alerts,
            registry,
            broadcaster,
            reconciler,
            config: RwLock::new(config),
            prober_factory,
        }
    }

    /// Replace live settings; the scheduler calls this on every tick so
    /// operator changes apply without a restart.
    pub async fn update_config(&self, config: DiscoverConfig) {
        *self.config.write().await = config;
    }

    pub fn registry(&self) -> Arc<ScanRegistry> {
        self.registry.clone()
    }

    pub fn broadcaster(&self) -> Arc<ProgressBroadcaster> {
        self.broadcaster.clone()
    }

    /// Start a scan over the given subnets, using the configured
    /// overlap policy (reject by default, queue when enabled).
    pub async fn start_scan(self: &Arc<Self>, subnet_ids: Vec<SubnetId>) -> Result<JobId> {
        let queue = self.config.read().await.queue_overlapping;
        self.start_scan_with_policy(subnet_ids, queue).await
    }

    /// Start a scan with an explicit overlap policy. The scheduler
    /// always rejects so periodic ticks can never back up.
    pub async fn start_scan_with_policy(
        self: &Arc<Self>,
        mut subnet_ids: Vec<SubnetId>,
        queue: bool,
    ) -> Result<JobId> {
        subnet_ids.sort_unstable();
        subnet_ids.dedup();
        if subnet_ids.is_empty() {
            return Err(DiscoverError::Config(
                "start_scan requires at least one subnet".to_string(),
            ));
        }

        // Synchronous validation: every id must exist right now.
        for id in &subnet_ids {
            if self.store.get_subnet(*id).await?.is_none() {
                return Err(DiscoverError::InvalidSubnet(*id));
            }
        }

        let job = ScanJob::new(subnet_ids.clone());
        let job_id = job.id;

        if !queue {
            // Claim before the job becomes visible so a rejected
            // request leaves no trace.
            self.registry.try_claim(job_id, &subnet_ids).await?;
        }
        let handle = self.registry.register(job).await;

        let coordinator = self.clone();
        tokio::spawn(async move {
            if queue {
                // A queued request can be cancelled while waiting; the
                // driver observes the flag immediately after.
                tokio::select! {
                    _ = handle.wait_cancelled() => {}
                    _ = coordinator.registry.claim_when_free(job_id, &subnet_ids) => {}
                }
            }
            coordinator.run_job(handle, subnet_ids).await;
        });

        tracing::info!(job_id = %job_id, queued = queue, "Scan job accepted");
        Ok(job_id)
    }

    /// Request cooperative cancellation of a running (or queued) job.
    pub async fn cancel_scan(&self, job_id: JobId) -> Result<()> {
        let handle = self
            .registry
            .get(job_id)
            .await
            .ok_or(DiscoverError::JobNotFound(job_id))?;
        let status = handle.snapshot().await.status;
        if status.is_terminal() {
            return Err(DiscoverError::AlreadyTerminal {
                job: job_id,
                status,
            });
        }
        handle.request_cancel();
        tracing::info!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    pub async fn get_status(&self, job_id: JobId) -> Result<ScanJob> {
        match self.registry.get(job_id).await {
            Some(handle) => Ok(handle.snapshot().await),
            None => Err(DiscoverError::JobNotFound(job_id)),
        }
    }

    /// Start a scan of every configured subnet. Used by the scheduler
    /// and the daemon's one-shot mode.
    pub async fn start_fleet_scan(self: &Arc<Self>) -> Result<JobId> {
        let ids: Vec<SubnetId> = self
            .store
            .list_subnets()
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.start_scan_with_policy(ids, false).await
    }

    /// Block until a job reaches a terminal state. Used by one-shot
    /// mode; interactive callers watch the progress channel instead.
    pub async fn wait_terminal(&self, job_id: JobId) -> Result<ScanJob> {
        loop {
            let job = self.get_status(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// The job driver. Runs on its own task until terminal.
    async fn run_job(self: Arc<Self>, handle: Arc<JobHandle>, subnet_ids: Vec<SubnetId>) {
        let job_id = handle.snapshot().await.id;
        let config = self.config.read().await.clone();
        let prober = (self.prober_factory)(&config);

        // A queued job may have been cancelled while waiting.
        if handle.cancel_requested() {
            self.finish_job(&handle, &subnet_ids, JobStatus::Cancelled)
                .await;
            return;
        }

        // Resolve targets; a subnet deleted since validation is noted
        // in the error summary and the rest proceed.
        let mut targets: Vec<Subnet> = Vec::new();
        let mut target_errors: Vec<String> = Vec::new();
        for id in &subnet_ids {
            match self.store.get_subnet(*id).await {
                Ok(Some(subnet)) => targets.push(subnet),
                Ok(None) => target_errors.push(format!("subnet {id} vanished before scan")),
                Err(e) => {
                    // Persistence gone before we started: whole job fails.
                    handle
                        .update(|j| j.error = Some(format!("inventory unavailable: {e}")))
                        .await;
                    self.finish_job(&handle, &subnet_ids, JobStatus::Failed)
                        .await;
                    return;
                }
            }
        }
        if targets.is_empty() {
            handle
                .update(|j| j.error = Some(target_errors.join("; ")))
                .await;
            self.finish_job(&handle, &subnet_ids, JobStatus::Failed)
                .await;
            return;
        }

        handle
            .update(|job| {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                for subnet in &targets {
                    let (total, _) = enumerate::enumerate_subnet(subnet);
                    job.progress.insert(
                        subnet.id,
                        TargetProgress {
                            total,
                            completed: 0,
                            found: 0,
                        },
                    );
                }
                if !target_errors.is_empty() {
                    job.error = Some(target_errors.join("; "));
                }
            })
            .await;

        let snapshot = handle.snapshot().await;
        let total = snapshot.total();
        self.broadcaster.set_active(snapshot.clone()).await;
        self.broadcaster
            .publish(ProgressEvent::JobStarted { job: snapshot });
        self.log_activity(ActivityLogEntry::new(
            ActivityKind::ScanStarted,
            job_id.to_string(),
            format!("Scanning {} subnet(s), {total} address(es)", targets.len()),
        ))
        .await;

        // Lazy address feed: (subnet, address) pairs, pulled only as
        // the pool frees up. A /8 target never materializes. Owned
        // subnets keep the stream free of borrows held across awaits.
        let addresses = targets.clone().into_iter().flat_map(|s| {
            let id = s.id;
            enumerate::enumerate_subnet(&s).1.map(move |a| (id, a))
        });
        let mut probes = stream::iter(addresses)
            .map(|(subnet_id, address)| {
                let prober = prober.clone();
                async move { (subnet_id, prober.probe(address).await) }
            })
            .buffer_unordered(config.max_concurrent_probes.max(1));

        let mut cancelled = false;
        let mut failed = false;
        loop {
            tokio::select! {
                biased;
                _ = handle.wait_cancelled() => {
                    cancelled = true;
                    break;
                }
                next = probes.next() => match next {
                    Some((subnet_id, result)) => {
                        if self
                            .handle_result(&handle, job_id, subnet_id, total, result)
                            .await
                            .is_err()
                        {
                            failed = true;
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        if cancelled {
            // Grace period: already-dispatched probes may still land
            // and their results are reconciled; stragglers past the
            // deadline are abandoned.
            let grace = Duration::from_millis(config.cancel_grace_ms);
            let drain = async {
                while let Some((subnet_id, result)) = probes.next().await {
                    if self
                        .handle_result(&handle, job_id, subnet_id, total, result)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            };
            if tokio::time::timeout(grace, drain).await.is_err() {
                tracing::debug!(job_id = %job_id, "Abandoned in-flight probes after grace period");
            }
        }

        let status = if failed {
            JobStatus::Failed
        } else if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        self.check_saturation(&handle, &targets, &config).await;
        self.finish_job(&handle, &subnet_ids, status).await;
    }

    /// Reconcile one probe result and publish its progress tick.
    /// An inventory error here fails the job; everything reconciled so
    /// far is already committed.
    async fn handle_result(
        &self,
        handle: &JobHandle,
        job_id: JobId,
        subnet_id: SubnetId,
        total: u64,
        result: ProbeResult,
    ) -> Result<()> {
        let outcome = match self.reconciler.reconcile(&result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %job_id, address = %result.address, error = %e, "Reconciliation failed");
                handle
                    .update(|j| j.error = Some(format!("reconciliation failed: {e}")))
                    .await;
                return Err(DiscoverError::JobAborted(e.to_string()));
            }
        };

        let snapshot = handle
            .update(|job| {
                let progress = job.progress.entry(subnet_id).or_default();
                progress.completed += 1;
                if result.alive {
                    progress.found += 1;
                }
                job.clone()
            })
            .await;
        let completed = snapshot.completed();
        self.broadcaster.set_active(snapshot).await;

        self.broadcaster.publish(ProgressEvent::HostProbed {
            job_id,
            phase: ScanPhase::Probing,
            current: completed,
            total,
            current_address: result.address,
            found: result.alive,
        });
        if outcome.newly_discovered {
            self.broadcaster.publish(ProgressEvent::DeviceDiscovered {
                job_id,
                address: result.address,
                hostname: result.hostname.clone(),
            });
        }
        Ok(())
    }

    /// Terminal sequence, shared by every exit path: final status,
    /// claim release, snapshot teardown, summary event, audit entry.
    async fn finish_job(&self, handle: &JobHandle, subnet_ids: &[SubnetId], status: JobStatus) {
        let job = handle
            .update(|job| {
                job.status = status;
                job.finished_at = Some(Utc::now());
                job.clone()
            })
            .await;

        self.registry.release(job.id, subnet_ids).await;
        self.broadcaster.clear_active(job.id).await;

        let summary = self.build_summary(&job).await;
        self.broadcaster
            .publish(ProgressEvent::JobFinished { summary });

        let kind = match status {
            JobStatus::Completed => ActivityKind::ScanCompleted,
            JobStatus::Cancelled => ActivityKind::ScanCancelled,
            _ => ActivityKind::ScanFailed,
        };
        self.log_activity(ActivityLogEntry::new(
            kind,
            job.id.to_string(),
            format!(
                "{} of {} address(es) probed, {} found{}",
                job.completed(),
                job.total(),
                job.found(),
                job.error
                    .as_deref()
                    .map(|e| format!("; {e}"))
                    .unwrap_or_default()
            ),
        ))
        .await;

        tracing::info!(
            job_id = %job.id,
            status = ?status,
            probed = job.completed(),
            found = job.found(),
            "Scan job finished"
        );
    }

    /// Dashboard summary. Built from the inventory where possible and
    /// degraded to the job's own counters when persistence is gone, so
    /// the terminal event still fires.
    async fn build_summary(&self, job: &ScanJob) -> ScanSummary {
        let mut summary = ScanSummary {
            job_id: job.id,
            status: job.status,
            online_devices: job.found(),
            subnets_scanned: job.subnet_ids.len() as u64,
            vendor_breakdown: Default::default(),
            device_type_breakdown: Default::default(),
            timestamp: Utc::now(),
        };

        if let Ok(devices) = self.store.list_devices().await {
            let in_scope: Vec<_> = devices
                .iter()
                .filter(|d| {
                    d.subnet_id
                        .map(|id| job.subnet_ids.contains(&id))
                        .unwrap_or(false)
                })
                .collect();
            summary.online_devices = in_scope
                .iter()
                .filter(|d| d.status == DeviceStatus::Online)
                .count() as u64;
            for device in &in_scope {
                let vendor = device.vendor.clone().unwrap_or_else(|| "unknown".into());
                *summary.vendor_breakdown.entry(vendor).or_insert(0) += 1;
                let kind = device
                    .device_type
                    .clone()
                    .unwrap_or_else(|| "unknown".into());
                *summary.device_type_breakdown.entry(kind).or_insert(0) += 1;
            }
        }
        summary
    }

    /// Alert when a subnet is close to exhausting its usable range.
    async fn check_saturation(
        &self,
        handle: &JobHandle,
        targets: &[Subnet],
        config: &DiscoverConfig,
    ) {
        let job = handle.snapshot().await;
        for subnet in targets {
            let Some(progress) = job.progress.get(&subnet.id) else {
                continue;
            };
            if progress.total == 0 {
                continue;
            }
            let ratio = progress.found as f64 / progress.total as f64;
            if ratio >= config.saturation_threshold {
                self.alerts
                    .notify(AlertEvent {
                        event_type: AlertKind::SubnetSaturation,
                        subject_id: subnet.id.to_string(),
                        detail: format!(
                            "{} at {:.0}% utilization ({}/{} addresses in use)",
                            subnet.name,
                            ratio * 100.0,
                            progress.found,
                            progress.total
                        ),
                    })
                    .await;
            }
        }
    }

    async fn log_activity(&self, entry: ActivityLogEntry) {
        if let Err(e) = self.store.append_activity(entry).await {
            tracing::warn!(error = %e, "Failed to append activity entry");
        }
    }
}

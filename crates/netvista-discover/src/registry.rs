//! Process-wide scan state: which job owns which subnet, and the live
//! handle for every job.
//!
//! The registry is plain injected state: the coordinator, scheduler,
//! and broadcaster all receive the same `Arc<ScanRegistry>`; there is
//! no ambient singleton. All claims for one request are taken under a
//! single write lock, which is what makes "at most one running job per
//! subnet" race-free when a manual and a scheduled trigger collide.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use netvista_core::types::{JobId, ScanJob, SubnetId};

use crate::error::{DiscoverError, Result};

/// Terminal jobs retained for `get_status` after completion.
const JOB_HISTORY_CAPACITY: usize = 256;

/// Shared, mutable view of one job.
pub struct JobHandle {
    job: RwLock<ScanJob>,
    cancel: AtomicBool,
    cancel_notify: Notify,
}

impl JobHandle {
    fn new(job: ScanJob) -> Self {
        Self {
            job: RwLock::new(job),
            cancel: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    pub async fn snapshot(&self) -> ScanJob {
        self.job.read().await.clone()
    }

    /// Mutate the job state under the write lock.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ScanJob) -> R,
    {
        let mut guard = self.job.write().await;
        f(&mut guard)
    }

    /// Cooperative cancellation flag, checked by the driver between
    /// probe dispatches.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn wait_cancelled(&self) {
        loop {
            let notified = self.cancel_notify.notified();
            tokio::pin!(notified);
            // Register as a waiter before checking the flag, so a
            // notify between check and await cannot be missed.
            notified.as_mut().enable();
            if self.cancel_requested() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Subnet → the running (or claim-holding) job.
    claims: HashMap<SubnetId, JobId>,
    jobs: HashMap<JobId, Arc<JobHandle>>,
    /// Terminal jobs in completion order, oldest first.
    history: VecDeque<JobId>,
}

/// Registry of all known scan jobs and their subnet claims.
#[derive(Default)]
pub struct ScanRegistry {
    inner: RwLock<RegistryInner>,
    released: Notify,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a job visible to `get_status` before it holds any claims.
    pub async fn register(&self, job: ScanJob) -> Arc<JobHandle> {
        let id = job.id;
        let handle = Arc::new(JobHandle::new(job));
        self.inner.write().await.jobs.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, job_id: JobId) -> Option<Arc<JobHandle>> {
        self.inner.read().await.jobs.get(&job_id).cloned()
    }

    /// Claim every subnet for this job, all-or-nothing. A single busy
    /// subnet rejects the whole request with `AlreadyRunning`.
    pub async fn try_claim(&self, job_id: JobId, subnets: &[SubnetId]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for subnet in subnets {
            if let Some(holder) = inner.claims.get(subnet) {
                return Err(DiscoverError::AlreadyRunning {
                    subnet: *subnet,
                    job: *holder,
                });
            }
        }
        for subnet in subnets {
            inner.claims.insert(*subnet, job_id);
        }
        Ok(())
    }

    /// Wait until every subnet is free, then claim. Used by queued
    /// start requests; wake order among multiple waiters is not
    /// guaranteed.
    pub async fn claim_when_free(&self, job_id: JobId, subnets: &[SubnetId]) {
        loop {
            // Arm the notification before the claim attempt so a
            // release between "try" and "wait" cannot be missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if self.try_claim(job_id, subnets).await.is_ok() {
                return;
            }
            released.await;
        }
    }

    /// True if any of the given subnets is currently claimed.
    pub async fn any_claimed(&self, subnets: &[SubnetId]) -> bool {
        let inner = self.inner.read().await;
        subnets.iter().any(|s| inner.claims.contains_key(s))
    }

    /// Release a job's claims after its terminal transition and retire
    /// it into bounded history.
    pub async fn release(&self, job_id: JobId, subnets: &[SubnetId]) {
        let mut inner = self.inner.write().await;
        for subnet in subnets {
            if inner.claims.get(subnet) == Some(&job_id) {
                inner.claims.remove(subnet);
            }
        }
        inner.history.push_back(job_id);
        while inner.history.len() > JOB_HISTORY_CAPACITY {
            if let Some(old) = inner.history.pop_front() {
                inner.jobs.remove(&old);
            }
        }
        drop(inner);
        self.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netvista_core::types::JobStatus;

    fn job_for(subnets: Vec<SubnetId>) -> ScanJob {
        ScanJob::new(subnets)
    }

    #[tokio::test]
    async fn test_second_claim_on_busy_subnet_is_rejected() {
        let registry = ScanRegistry::new();
        let subnet = SubnetId::new();
        let first = job_for(vec![subnet]);
        let first_id = first.id;
        registry.register(first).await;
        registry.try_claim(first_id, &[subnet]).await.unwrap();

        let second = job_for(vec![subnet]);
        let second_id = second.id;
        registry.register(second).await;
        let err = registry.try_claim(second_id, &[subnet]).await.unwrap_err();
        assert!(matches!(
            err,
            DiscoverError::AlreadyRunning { subnet: s, job } if s == subnet && job == first_id
        ));
    }

    #[tokio::test]
    async fn test_claims_are_all_or_nothing() {
        let registry = ScanRegistry::new();
        let (a, b) = (SubnetId::new(), SubnetId::new());

        let holder = job_for(vec![b]);
        let holder_id = holder.id;
        registry.register(holder).await;
        registry.try_claim(holder_id, &[b]).await.unwrap();

        // Losing on b must leave a unclaimed.
        let contender = job_for(vec![a, b]);
        let contender_id = contender.id;
        registry.register(contender).await;
        assert!(registry.try_claim(contender_id, &[a, b]).await.is_err());
        assert!(!registry.any_claimed(&[a]).await);
    }

    #[tokio::test]
    async fn test_release_frees_claims_and_wakes_waiters() {
        let registry = Arc::new(ScanRegistry::new());
        let subnet = SubnetId::new();

        let first = job_for(vec![subnet]);
        let first_id = first.id;
        registry.register(first).await;
        registry.try_claim(first_id, &[subnet]).await.unwrap();

        let second = job_for(vec![subnet]);
        let second_id = second.id;
        registry.register(second).await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.claim_when_free(second_id, &[subnet]).await;
            })
        };

        registry.release(first_id, &[subnet]).await;
        waiter.await.unwrap();
        assert!(registry.any_claimed(&[subnet]).await);
    }

    #[tokio::test]
    async fn test_terminal_jobs_stay_queryable() {
        let registry = ScanRegistry::new();
        let subnet = SubnetId::new();
        let job = job_for(vec![subnet]);
        let job_id = job.id;
        let handle = registry.register(job).await;
        registry.try_claim(job_id, &[subnet]).await.unwrap();

        handle
            .update(|j| j.status = JobStatus::Completed)
            .await;
        registry.release(job_id, &[subnet]).await;

        let snapshot = registry.get(job_id).await.unwrap().snapshot().await;
        assert_eq!(snapshot.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_flag_round_trip() {
        let registry = ScanRegistry::new();
        let handle = registry.register(job_for(vec![SubnetId::new()])).await;
        assert!(!handle.cancel_requested());
        handle.request_cancel();
        assert!(handle.cancel_requested());
    }
}

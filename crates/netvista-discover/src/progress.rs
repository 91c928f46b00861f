//! Progress fan-out: publish/subscribe channel with replay-on-subscribe.
//!
//! Observers (the web tier's WebSocket layer, the daemon's log task)
//! subscribe and first receive the latest known state (the running
//! job's snapshot, or `Idle`) before any incremental event, so no
//! subscriber ever starts unseeded. Delivery is at-least-once; a slow
//! subscriber can lag and miss intermediate ticks, never block the
//! coordinator.

use tokio::sync::{broadcast, RwLock};

use netvista_core::events::ProgressEvent;
use netvista_core::types::{JobId, ScanJob};

/// Buffered events per subscriber before lag kicks in.
const CHANNEL_CAPACITY: usize = 512;

pub struct ProgressBroadcaster {
    tx: broadcast::Sender<ProgressEvent>,
    latest: RwLock<Option<ScanJob>>,
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            latest: RwLock::new(None),
        }
    }

    /// Subscribe, receiving the replay event to deliver first and the
    /// live receiver for everything after it.
    pub async fn subscribe(&self) -> (ProgressEvent, broadcast::Receiver<ProgressEvent>) {
        // Take the receiver before reading the snapshot so an event
        // published in between is seen live rather than lost.
        let rx = self.tx.subscribe();
        let replay = match self.latest.read().await.clone() {
            Some(job) => ProgressEvent::Snapshot { job },
            None => ProgressEvent::Idle,
        };
        (replay, rx)
    }

    /// Retain the snapshot replayed to late subscribers.
    pub async fn set_active(&self, job: ScanJob) {
        *self.latest.write().await = Some(job);
    }

    /// Drop the retained snapshot once its job is terminal.
    pub async fn clear_active(&self, job_id: JobId) {
        let mut latest = self.latest.write().await;
        if latest.as_ref().map(|j| j.id) == Some(job_id) {
            *latest = None;
        }
    }

    /// Fan an event out to all current subscribers. An empty audience
    /// is not an error.
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netvista_core::types::{JobStatus, SubnetId};

    #[tokio::test]
    async fn test_idle_replay_when_no_job_active() {
        let broadcaster = ProgressBroadcaster::new();
        let (replay, _rx) = broadcaster.subscribe().await;
        assert!(matches!(replay, ProgressEvent::Idle));
    }

    #[tokio::test]
    async fn test_mid_scan_subscriber_gets_snapshot_first() {
        let broadcaster = ProgressBroadcaster::new();
        let mut job = ScanJob::new(vec![SubnetId::new()]);
        job.status = JobStatus::Running;
        broadcaster.set_active(job.clone()).await;

        let (replay, _rx) = broadcaster.subscribe().await;
        match replay {
            ProgressEvent::Snapshot { job: snapshot } => {
                assert_eq!(snapshot.id, job.id);
                assert_eq!(snapshot.status, JobStatus::Running);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_fan_out_to_all_subscribers() {
        let broadcaster = ProgressBroadcaster::new();
        let (_replay_a, mut rx_a) = broadcaster.subscribe().await;
        let (_replay_b, mut rx_b) = broadcaster.subscribe().await;

        broadcaster.publish(ProgressEvent::Idle);

        assert!(matches!(rx_a.recv().await.unwrap(), ProgressEvent::Idle));
        assert!(matches!(rx_b.recv().await.unwrap(), ProgressEvent::Idle));
    }

    #[tokio::test]
    async fn test_clear_active_ignores_other_jobs() {
        let broadcaster = ProgressBroadcaster::new();
        let job = ScanJob::new(vec![SubnetId::new()]);
        broadcaster.set_active(job.clone()).await;

        broadcaster.clear_active(JobId::new()).await;
        let (replay, _rx) = broadcaster.subscribe().await;
        assert!(matches!(replay, ProgressEvent::Snapshot { .. }));

        broadcaster.clear_active(job.id).await;
        let (replay, _rx) = broadcaster.subscribe().await;
        assert!(matches!(replay, ProgressEvent::Idle));
    }
}

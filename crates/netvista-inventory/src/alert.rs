//! Notification collaborator seam.

use async_trait::async_trait;

use netvista_core::events::AlertEvent;

/// Receives device-offline and subnet-saturation events. Delivery
/// transport (email, webhook) is the collaborator's concern.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: AlertEvent);
}

/// Default sink: structured log lines only.
#[derive(Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn notify(&self, event: AlertEvent) {
        tracing::warn!(
            event_type = ?event.event_type,
            subject = %event.subject_id,
            detail = %event.detail,
            "Alert raised"
        );
    }
}

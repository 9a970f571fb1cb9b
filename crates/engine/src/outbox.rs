//! Asynchronous delivery of outbox events to the notification service and
//! the analytics collector.

use std::sync::Arc;

use campaign_core::event_bus::{AnalyticsCollector, Notifier, OutboxEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub struct OutboxDispatcher {
    notifier: Arc<dyn Notifier>,
    collector: Arc<dyn AnalyticsCollector>,
}

impl OutboxDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, collector: Arc<dyn AnalyticsCollector>) -> Self {
        Self { notifier, collector }
    }

    /// Deliver `events` on a background task. Failures are logged and
    /// counted; the returned handle never carries an error.
    pub fn dispatch(&self, events: Vec<OutboxEvent>) -> Option<JoinHandle<()>> {
        if events.is_empty() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            for event in events {
                this.deliver(&event).await;
            }
        }))
    }

    pub async fn deliver(&self, event: &OutboxEvent) {
        let (target, result) = match event {
            OutboxEvent::NotifyApproved { campaign } => {
                ("notify_approved", self.notifier.notify_approved(campaign).await)
            }
            OutboxEvent::NotifyRejected { campaign, reason } => {
                ("notify_rejected", self.notifier.notify_rejected(campaign, reason).await)
            }
            OutboxEvent::TrackImpression { campaign_id, title } => {
                ("track_impression", self.collector.track_impression(*campaign_id, title).await)
            }
            OutboxEvent::TrackClick { campaign_id, title } => {
                ("track_click", self.collector.track_click(*campaign_id, title).await)
            }
            OutboxEvent::Transitioned { campaign_id, from, to, event, actor } => {
                info!(
                    campaign_id = %campaign_id,
                    from = %from,
                    to = %to,
                    event = %event,
                    actor_id = %actor.id,
                    actor_role = ?actor.role,
                    "audit: campaign status changed"
                );
                return;
            }
        };

        if let Err(e) = result {
            metrics::counter!("outbox.dispatch_errors", "target" => target).increment(1);
            warn!(target = target, error = %e, "Outbox delivery failed");
        }
    }
}

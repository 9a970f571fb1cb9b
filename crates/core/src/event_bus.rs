//! Outbox of best-effort side effects and the collaborator traits that
//! deliver them.
//!
//! Engine operations never talk to the notification service or the
//! analytics collector directly. They return an [`Outcome`] whose outbox
//! lists what should be sent; the caller dispatches it asynchronously and a
//! delivery failure never reaches the operation's result.

use crate::types::{Actor, Campaign, CampaignStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEvent {
    NotifyApproved {
        campaign: Campaign,
    },
    NotifyRejected {
        campaign: Campaign,
        reason: String,
    },
    TrackImpression {
        campaign_id: Uuid,
        title: String,
    },
    TrackClick {
        campaign_id: Uuid,
        title: String,
    },
    Transitioned {
        campaign_id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
        event: String,
        actor: Actor,
    },
}

/// Primary result of an engine operation plus the side effects it produced.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub outbox: Vec<OutboxEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, outbox: Vec<OutboxEvent>) -> Self {
        Self { value, outbox }
    }

    pub fn quiet(value: T) -> Self {
        Self { value, outbox: Vec::new() }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome { value: f(self.value), outbox: self.outbox }
    }
}

/// Outbound notifications to campaign owners (email service).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_approved(&self, campaign: &Campaign) -> anyhow::Result<()>;
    async fn notify_rejected(&self, campaign: &Campaign, reason: &str) -> anyhow::Result<()>;
}

/// External analytics collector.
#[async_trait]
pub trait AnalyticsCollector: Send + Sync {
    async fn track_impression(&self, campaign_id: Uuid, title: &str) -> anyhow::Result<()>;
    async fn track_click(&self, campaign_id: Uuid, title: &str) -> anyhow::Result<()>;
}

/// No-op collaborator for deployments without a notification or analytics backend.
pub struct NoOpSink;

#[async_trait]
impl Notifier for NoOpSink {
    async fn notify_approved(&self, _campaign: &Campaign) -> anyhow::Result<()> {
        Ok(())
    }

    async fn notify_rejected(&self, _campaign: &Campaign, _reason: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AnalyticsCollector for NoOpSink {
    async fn track_impression(&self, _campaign_id: Uuid, _title: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn track_click(&self, _campaign_id: Uuid, _title: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a [`CaptureSink`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Approved(Uuid),
    Rejected(Uuid, String),
    Impression(Uuid),
    Click(Uuid),
}

/// In-memory collaborator that records deliveries, for testing.
/// With `failing` set, every delivery is recorded and then reported as failed.
#[derive(Default)]
pub struct CaptureSink {
    delivered: Mutex<Vec<Delivered>>,
    failing: bool,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { delivered: Mutex::new(Vec::new()), failing: true }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, d: Delivered) -> anyhow::Result<()> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).push(d);
        if self.failing {
            anyhow::bail!("capture sink configured to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for CaptureSink {
    async fn notify_approved(&self, campaign: &Campaign) -> anyhow::Result<()> {
        self.record(Delivered::Approved(campaign.id))
    }

    async fn notify_rejected(&self, campaign: &Campaign, reason: &str) -> anyhow::Result<()> {
        self.record(Delivered::Rejected(campaign.id, reason.to_string()))
    }
}

#[async_trait]
impl AnalyticsCollector for CaptureSink {
    async fn track_impression(&self, campaign_id: Uuid, _title: &str) -> anyhow::Result<()> {
        self.record(Delivered::Impression(campaign_id))
    }

    async fn track_click(&self, campaign_id: Uuid, _title: &str) -> anyhow::Result<()> {
        self.record(Delivered::Click(campaign_id))
    }
}

/// Convenience: a no-op sink usable as either collaborator.
pub fn noop_sink() -> Arc<NoOpSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

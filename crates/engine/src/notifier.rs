//! Owner notifications over NATS, consumed by the external email service.

use async_trait::async_trait;
use campaign_core::event_bus::Notifier;
use campaign_core::types::Campaign;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, PartialEq)]
pub struct CampaignNotification<'a> {
    pub campaign_id: Uuid,
    pub owner_id: Uuid,
    pub title: &'a str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

impl<'a> CampaignNotification<'a> {
    pub fn new(campaign: &'a Campaign, reason: Option<&'a str>) -> Self {
        Self {
            campaign_id: campaign.id,
            owner_id: campaign.owner_id,
            title: &campaign.title,
            status: campaign.status.as_str(),
            reason,
        }
    }
}

/// Publishes to `<prefix>.approved` and `<prefix>.rejected`.
pub struct NatsNotifier {
    client: async_nats::Client,
    prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject(&self, outcome: &str) -> String {
        format!("{}.{}", self.prefix, outcome)
    }

    async fn publish(&self, outcome: &str, body: &CampaignNotification<'_>) -> anyhow::Result<()> {
        let subject = self.subject(outcome);
        let payload = serde_json::to_vec(body)?;
        self.client.publish(subject.clone(), payload.into()).await?;
        debug!(subject = %subject, campaign_id = %body.campaign_id, "Notification published");
        Ok(())
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify_approved(&self, campaign: &Campaign) -> anyhow::Result<()> {
        self.publish("approved", &CampaignNotification::new(campaign, None)).await
    }

    async fn notify_rejected(&self, campaign: &Campaign, reason: &str) -> anyhow::Result<()> {
        self.publish("rejected", &CampaignNotification::new(campaign, Some(reason))).await
    }
}

//! Payment gateway callbacks delivered over NATS.

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::AdEngine;

const QUEUE_GROUP: &str = "ad-engine-payments";

/// `{"campaign_id": "<uuid>"}`, optionally with the gateway's transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentEvent {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub transaction_id: Option<Uuid>,
}

/// Consumes payment-succeeded events and auto-approves the campaign.
pub struct PaymentConsumer {
    engine: AdEngine,
}

impl PaymentConsumer {
    pub fn new(engine: AdEngine) -> Self {
        Self { engine }
    }

    /// Spawn the consumer on a queue group so several engine nodes share
    /// the subject without double-processing.
    pub fn spawn(self, client: async_nats::Client, subject: String) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(subject = %subject, "Payment consumer subscribing");

            let subscriber = match client
                .queue_subscribe(subject.clone(), QUEUE_GROUP.to_string())
                .await
            {
                Ok(sub) => sub,
                Err(e) => {
                    error!(subject = %subject, error = %e, "Failed to subscribe to payment events");
                    return;
                }
            };

            self.process_messages(subscriber).await;
        })
    }

    async fn process_messages(self, mut subscriber: async_nats::Subscriber) {
        while let Some(msg) = subscriber.next().await {
            self.handle(&msg.payload).await;
        }
        warn!("Payment subscription closed");
    }

    pub async fn handle(&self, payload: &[u8]) {
        let event: PaymentEvent = match serde_json::from_slice(payload) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize payment event");
                metrics::counter!("payments.deserialize_errors").increment(1);
                return;
            }
        };

        match self.engine.handle_payment(&event).await {
            Ok(_) => {
                metrics::counter!("payments.processed").increment(1);
            }
            Err(e) if e.is_client_error() => {
                warn!(
                    campaign_id = %event.campaign_id,
                    kind = e.kind(),
                    error = %e,
                    "Payment event refused"
                );
                metrics::counter!("payments.refused").increment(1);
            }
            Err(e) => {
                error!(campaign_id = %event.campaign_id, error = %e, "Payment event failed");
                metrics::counter!("payments.errors").increment(1);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campaign_core::config::AppConfig;
    use campaign_core::event_bus::noop_sink;
    use campaign_core::types::{Actor, AdType, CampaignStatus, CreateCampaign};
    use campaign_store::{CampaignStore, MemoryStore};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[test]
    fn test_payment_event_shape() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"campaign_id":"{id}"}}"#);
        let ev: PaymentEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(ev, PaymentEvent { campaign_id: id, transaction_id: None });
    }

    #[tokio::test]
    async fn test_handle_activates_campaign() {
        let store = Arc::new(MemoryStore::new());
        let engine = AdEngine::new(&AppConfig::default(), store.clone(), noop_sink(), noop_sink());
        let start = Utc::now();
        let c = engine
            .create(
                CreateCampaign {
                    title: "Launch".into(),
                    ad_type: AdType::BannerTop,
                    position: None,
                    image_url: "https://cdn.example.com/l.png".into(),
                    target_link: "https://example.com/l".into(),
                    start_date: start,
                    end_date: start + Duration::days(2),
                    price_override: None,
                    owner_id: None,
                },
                &Actor::advertiser(Uuid::new_v4()),
            )
            .await
            .unwrap();

        let consumer = PaymentConsumer::new(engine);
        consumer.handle(b"not json").await;
        consumer.handle(format!(r#"{{"campaign_id":"{}"}}"#, Uuid::new_v4()).as_bytes()).await;
        consumer.handle(format!(r#"{{"campaign_id":"{}"}}"#, c.id).as_bytes()).await;

        let stored = store.get(c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Active);
        assert!(stored.is_paid);
    }
}

use std::sync::Arc;

use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::event_bus::{OutboxEvent, Outcome};
use campaign_core::types::EngagementKind;
use campaign_store::CampaignStore;
use tracing::debug;
use uuid::Uuid;

/// Click-through rate as a percentage, rounded to two decimals.
/// Zero when there are no impressions.
pub fn ctr(impressions: u64, clicks: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    let pct = clicks as f64 / impressions as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Records impressions and clicks through the store's atomic increment.
///
/// Each call returns the new counter value plus a tracking event for the
/// analytics collector; the caller dispatches it and its failure never
/// affects the increment.
#[derive(Clone)]
pub struct EngagementCounter {
    store: Arc<dyn CampaignStore>,
}

impl EngagementCounter {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    pub async fn record_impression(&self, id: Uuid) -> CampaignResult<Outcome<u64>> {
        self.record(id, EngagementKind::Impression).await
    }

    pub async fn record_click(&self, id: Uuid) -> CampaignResult<Outcome<u64>> {
        self.record(id, EngagementKind::Click).await
    }

    async fn record(&self, id: Uuid, kind: EngagementKind) -> CampaignResult<Outcome<u64>> {
        let updated = self
            .store
            .increment(id, kind)
            .await?
            .ok_or(CampaignError::NotFound)?;

        let (count, event) = match kind {
            EngagementKind::Impression => {
                metrics::counter!("engagement.impressions").increment(1);
                (
                    updated.impressions,
                    OutboxEvent::TrackImpression { campaign_id: id, title: updated.title },
                )
            }
            EngagementKind::Click => {
                metrics::counter!("engagement.clicks").increment(1);
                (
                    updated.clicks,
                    OutboxEvent::TrackClick { campaign_id: id, title: updated.title },
                )
            }
        };
        debug!(campaign_id = %id, counter = kind.field(), value = count, "Engagement recorded");
        Ok(Outcome::new(count, vec![event]))
    }
}

//! Dashboard metrics per campaign and per advertiser.

use std::sync::Arc;

use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{Actor, Campaign, CampaignStatus, Role};
use campaign_store::CampaignStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::counter::ctr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignMetrics {
    pub campaign_id: Uuid,
    pub title: String,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub status: CampaignStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl From<&Campaign> for CampaignMetrics {
    fn from(c: &Campaign) -> Self {
        Self {
            campaign_id: c.id,
            title: c.title.clone(),
            impressions: c.impressions,
            clicks: c.clicks,
            ctr: ctr(c.impressions, c.clicks),
            status: c.status,
            start_date: c.start_date,
            end_date: c.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvertiserSummary {
    pub owner_id: Uuid,
    pub total_ads: usize,
    pub total_impressions: u64,
    pub total_clicks: u64,
    /// From the summed totals, not a mean of per-ad CTRs.
    pub average_ctr: f64,
    pub ads: Vec<CampaignMetrics>,
}

#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: Arc<dyn CampaignStore>,
}

// Advertisers only see their own numbers; staff roles see everyone's.
fn may_view(actor: &Actor, owner_id: Uuid) -> bool {
    actor.role != Role::Advertiser || actor.id == owner_id
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    pub async fn per_campaign(&self, id: Uuid, actor: &Actor) -> CampaignResult<CampaignMetrics> {
        let campaign = self.store.get(id).await?.ok_or(CampaignError::NotFound)?;
        if !may_view(actor, campaign.owner_id) {
            return Err(CampaignError::Unauthorized);
        }
        Ok(CampaignMetrics::from(&campaign))
    }

    pub async fn per_advertiser(
        &self,
        owner_id: Uuid,
        actor: &Actor,
    ) -> CampaignResult<AdvertiserSummary> {
        if !may_view(actor, owner_id) {
            return Err(CampaignError::Unauthorized);
        }
        let campaigns = self.store.list_by_owner(owner_id).await?;
        Ok(summarize(owner_id, &campaigns))
    }
}

pub fn summarize(owner_id: Uuid, campaigns: &[Campaign]) -> AdvertiserSummary {
    let ads: Vec<CampaignMetrics> = campaigns.iter().map(CampaignMetrics::from).collect();
    let total_impressions = ads.iter().map(|a| a.impressions).sum();
    let total_clicks = ads.iter().map(|a| a.clicks).sum();
    AdvertiserSummary {
        owner_id,
        total_ads: ads.len(),
        total_impressions,
        total_clicks,
        average_ctr: ctr(total_impressions, total_clicks),
        ads,
    }
}

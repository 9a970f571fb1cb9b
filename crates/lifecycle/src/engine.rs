use std::sync::Arc;

use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::event_bus::Outcome;
use campaign_core::types::{
    normalize_position, Actor, Campaign, CampaignStatus, CreateCampaign, Role, StatusPatch,
};
use campaign_serving::PricingEngine;
use campaign_store::{CampaignStore, CasOutcome};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state_machine::{transition, Effect, LifecycleEvent, Transition};

// A write guarded on the status the transition was planned from.
fn settle_cas(outcome: CasOutcome) -> CampaignResult<Option<Campaign>> {
    match outcome {
        CasOutcome::Applied(c) => Ok(Some(c)),
        CasOutcome::Conflict(actual) => Err(CampaignError::InvalidState(format!(
            "Campaign changed concurrently and is now {actual}"
        ))),
        CasOutcome::Missing => Err(CampaignError::NotFound),
    }
}

/// Applies lifecycle events to stored campaigns.
///
/// Status changes are written with compare-and-set against the status the
/// guard saw, so a concurrent transition on the same record surfaces as
/// `InvalidState` instead of being overwritten.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn CampaignStore>,
    pricing: PricingEngine,
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn CampaignStore>, pricing: PricingEngine) -> Self {
        Self { store, pricing }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Create a PENDING, unpaid campaign priced from its type and dates.
    pub async fn create(
        &self,
        input: CreateCampaign,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CampaignResult<Campaign> {
        if !matches!(actor.role, Role::Admin | Role::Advertiser) {
            return Err(CampaignError::Unauthorized);
        }
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CampaignError::Validation("Title is required".to_string()));
        }

        let owner_id = if actor.is_admin() {
            input.owner_id.unwrap_or(actor.id)
        } else {
            actor.id
        };
        let price_override = match input.price_override {
            Some(_) if !actor.is_admin() => {
                warn!(actor_id = %actor.id, "Ignoring price override from non-admin");
                None
            }
            other => other,
        };
        let price = self
            .pricing
            .price(input.ad_type, input.start_date, input.end_date, price_override)?;

        let campaign = Campaign {
            id: Uuid::new_v4(),
            title: title.to_string(),
            ad_type: input.ad_type,
            position: normalize_position(input.position.as_ref()),
            image_url: input.image_url,
            target_link: input.target_link,
            price,
            is_paid: false,
            status: CampaignStatus::Pending,
            rejection_reason: None,
            start_date: input.start_date,
            end_date: input.end_date,
            impressions: 0,
            clicks: 0,
            owner_id,
            created_at: now,
            updated_at: now,
        };
        self.store.create(&campaign).await?;

        info!(
            campaign_id = %campaign.id,
            owner_id = %owner_id,
            ad_type = %campaign.ad_type,
            price = %campaign.price,
            "Campaign created"
        );
        Ok(campaign)
    }

    /// Run `event` against the stored campaign and persist the result.
    /// The value is `None` when the event removed the campaign.
    pub async fn apply(
        &self,
        id: Uuid,
        event: LifecycleEvent,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CampaignResult<Outcome<Option<Campaign>>> {
        let current = self.store.get(id).await?.ok_or(CampaignError::NotFound)?;
        let kind = event.kind();

        let planned = match transition(&current, &event, actor, now) {
            Ok(t) => t,
            Err(e) => {
                metrics::counter!("lifecycle.rejected_transitions", "event" => kind.as_str())
                    .increment(1);
                debug!(campaign_id = %id, event = %kind, error = %e, "Transition refused");
                return Err(e);
            }
        };

        let stored = self.persist(id, &event, &planned).await?;
        metrics::counter!("lifecycle.transitions", "event" => kind.as_str()).increment(1);
        info!(
            campaign_id = %id,
            event = %kind,
            from = %planned.from,
            to = %planned.campaign.status,
            actor_id = %actor.id,
            "Campaign transition applied"
        );
        Ok(Outcome::new(stored, planned.outbox))
    }

    async fn persist(
        &self,
        id: Uuid,
        event: &LifecycleEvent,
        planned: &Transition,
    ) -> CampaignResult<Option<Campaign>> {
        if planned.has(Effect::RemoveRecord) {
            return match self.store.delete(id).await? {
                true => Ok(None),
                false => Err(CampaignError::NotFound),
            };
        }
        if planned.has(Effect::ApplyEdit) {
            let LifecycleEvent::Edit(update) = event else {
                return Err(CampaignError::InvalidState("edit without changes".to_string()));
            };
            let outcome = self.store.update(id, planned.from, update).await?;
            return settle_cas(outcome);
        }

        let patch = StatusPatch::of(&planned.campaign);
        settle_cas(self.store.compare_and_set_status(id, planned.from, &patch).await?)
    }

    /// Move every ACTIVE or PAUSED campaign past its end date to EXPIRED.
    pub async fn expire_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> CampaignResult<Outcome<Vec<Campaign>>> {
        let overdue = self.store.find_overdue(now).await?;
        let system = Actor::system();
        let mut expired = Vec::with_capacity(overdue.len());
        let mut outbox = Vec::new();

        for campaign in overdue {
            match self.apply(campaign.id, LifecycleEvent::Expire, &system, now).await {
                Ok(outcome) => {
                    outbox.extend(outcome.outbox);
                    expired.extend(outcome.value);
                }
                Err(e) if e.is_client_error() => {
                    debug!(campaign_id = %campaign.id, error = %e, "Skipping expiry");
                }
                Err(e) => return Err(e),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue campaigns");
        }
        Ok(Outcome::new(expired, outbox))
    }
}

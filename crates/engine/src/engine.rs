use std::sync::Arc;

use campaign_analytics::{
    AdvertiserSummary, AnalyticsAggregator, CampaignMetrics, EngagementCounter,
};
use campaign_core::config::AppConfig;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::event_bus::{AnalyticsCollector, Notifier, Outcome};
use campaign_core::types::{Actor, AdType, Campaign, CreateCampaign, SlotFilter};
use campaign_lifecycle::{LifecycleEngine, LifecycleEvent};
use campaign_serving::{PricingEngine, RotationSelector, SlotResolver};
use campaign_store::{CampaignStore, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::outbox::OutboxDispatcher;
use crate::payments::PaymentEvent;

/// Caller-facing surface of the ad engine.
///
/// Every mutating operation returns once the store write has completed.
/// Notifications and analytics events produced along the way are handed to
/// the [`OutboxDispatcher`] and delivered in the background.
#[derive(Clone)]
pub struct AdEngine {
    store: Arc<dyn CampaignStore>,
    resolver: SlotResolver,
    selector: RotationSelector,
    lifecycle: LifecycleEngine,
    counter: EngagementCounter,
    aggregator: AnalyticsAggregator,
    dispatcher: OutboxDispatcher,
    default_limit: usize,
}

impl AdEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn CampaignStore>,
        notifier: Arc<dyn Notifier>,
        collector: Arc<dyn AnalyticsCollector>,
    ) -> Self {
        let pricing = PricingEngine::new(&config.pricing);
        Self {
            resolver: SlotResolver,
            selector: RotationSelector,
            lifecycle: LifecycleEngine::new(store.clone(), pricing),
            counter: EngagementCounter::new(store.clone()),
            aggregator: AnalyticsAggregator::new(store.clone()),
            dispatcher: OutboxDispatcher::new(notifier, collector),
            default_limit: config.rotation.default_limit,
            store,
        }
    }

    pub fn resolve_slot(&self, slot: &str, now: DateTime<Utc>) -> SlotFilter {
        self.resolver.resolve_filter(slot, now)
    }

    pub fn select(&self, pool: &[Campaign], limit: usize) -> Vec<Campaign> {
        self.selector.select(pool, limit)
    }

    pub fn price(
        &self,
        ad_type: AdType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        price_override: Option<Decimal>,
    ) -> CampaignResult<Decimal> {
        self.lifecycle.pricing().price(ad_type, start, end, price_override)
    }

    /// Resolve `slot`, load the eligible pool and pick what to render.
    /// Nothing is counted here; impressions are recorded after rendering.
    pub async fn serve(
        &self,
        slot: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> CampaignResult<Vec<Campaign>> {
        let filter = self.resolve_slot(slot, now);
        let pool = self.store.find_eligible(&filter).await?;
        let picked = self.select(&pool, limit.unwrap_or(self.default_limit));
        debug!(slot = slot, pool = pool.len(), served = picked.len(), "Slot served");
        Ok(picked)
    }

    pub async fn create(&self, input: CreateCampaign, actor: &Actor) -> CampaignResult<Campaign> {
        self.lifecycle.create(input, actor, Utc::now()).await
    }

    /// Apply a lifecycle event. `None` means the campaign was deleted.
    pub async fn transition(
        &self,
        id: Uuid,
        event: LifecycleEvent,
        actor: &Actor,
    ) -> CampaignResult<Option<Campaign>> {
        let outcome = self.lifecycle.apply(id, event, actor, Utc::now()).await?;
        Ok(self.settle(outcome))
    }

    pub async fn record_impression(&self, id: Uuid) -> CampaignResult<u64> {
        let outcome = self.counter.record_impression(id).await?;
        Ok(self.settle(outcome))
    }

    pub async fn record_click(&self, id: Uuid) -> CampaignResult<u64> {
        let outcome = self.counter.record_click(id).await?;
        Ok(self.settle(outcome))
    }

    pub async fn campaign_analytics(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> CampaignResult<CampaignMetrics> {
        self.aggregator.per_campaign(id, actor).await
    }

    pub async fn advertiser_analytics(
        &self,
        owner_id: Uuid,
        actor: &Actor,
    ) -> CampaignResult<AdvertiserSummary> {
        self.aggregator.per_advertiser(owner_id, actor).await
    }

    /// Gateway callback: record the transaction, then auto-approve.
    /// Events for unknown campaigns are refused before anything is written.
    pub async fn handle_payment(&self, event: &PaymentEvent) -> CampaignResult<Option<Campaign>> {
        self.store.get(event.campaign_id).await?.ok_or(CampaignError::NotFound)?;
        if let Some(txn) = event.transaction_id {
            self.store
                .record_transaction(event.campaign_id, txn, TransactionStatus::Succeeded)
                .await?;
        }
        self.transition(event.campaign_id, LifecycleEvent::PaymentSucceeded, &Actor::system())
            .await
    }

    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> CampaignResult<Vec<Campaign>> {
        let outcome = self.lifecycle.expire_overdue(now).await?;
        if !outcome.value.is_empty() {
            info!(count = outcome.value.len(), "Expiry sweep completed");
        }
        Ok(self.settle(outcome))
    }

    fn settle<T>(&self, outcome: Outcome<T>) -> T {
        self.dispatcher.dispatch(outcome.outbox);
        outcome.value
    }
}

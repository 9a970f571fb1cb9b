//! In-process campaign store backed by DashMap.
//!
//! Per-record writes happen under the entry's shard lock, which gives the
//! same atomicity the Redis backend gets from its scripts. Used for
//! development, single-node deployments and tests.

use crate::{merged_edit, CampaignStore, CasOutcome, TransactionStatus};
use async_trait::async_trait;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{
    Campaign, CampaignStatus, EngagementKind, SlotFilter, StatusPatch, UpdateCampaign,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    campaigns: DashMap<Uuid, Campaign>,
    transactions: DashMap<Uuid, Vec<(Uuid, TransactionStatus)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Campaign store initialized (in-memory)");
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    /// Transactions recorded against `campaign_id`.
    pub fn transaction_count(&self, campaign_id: Uuid) -> usize {
        self.transactions.get(&campaign_id).map_or(0, |t| t.len())
    }

    fn collect_sorted(&self, pred: impl Fn(&Campaign) -> bool) -> Vec<Campaign> {
        let mut out: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn find_eligible(&self, filter: &SlotFilter) -> CampaignResult<Vec<Campaign>> {
        Ok(self.collect_sorted(|c| filter.matches(c)))
    }

    async fn get(&self, id: Uuid) -> CampaignResult<Option<Campaign>> {
        Ok(self.campaigns.get(&id).map(|r| r.value().clone()))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> CampaignResult<Vec<Campaign>> {
        Ok(self.collect_sorted(|c| c.owner_id == owner_id))
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> CampaignResult<Vec<Campaign>> {
        Ok(self.collect_sorted(|c| {
            matches!(c.status, CampaignStatus::Active | CampaignStatus::Paused) && c.end_date < now
        }))
    }

    async fn create(&self, campaign: &Campaign) -> CampaignResult<()> {
        self.campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        edit: &UpdateCampaign,
    ) -> CampaignResult<CasOutcome> {
        let Some(mut entry) = self.campaigns.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        let c = entry.value_mut();
        if c.status != expected {
            debug!(
                campaign_id = %id,
                expected = %expected,
                actual = %c.status,
                "Edit CAS conflict"
            );
            return Ok(CasOutcome::Conflict(c.status));
        }
        *c = merged_edit(c, edit)?;
        Ok(CasOutcome::Applied(c.clone()))
    }

    async fn delete(&self, id: Uuid) -> CampaignResult<bool> {
        let blocked = self
            .transactions
            .get(&id)
            .is_some_and(|txns| txns.iter().any(|(_, status)| status.blocks_delete()));
        if blocked {
            return Err(CampaignError::DeleteBlocked(
                "campaign has pending or completed payments".to_string(),
            ));
        }
        let removed = self.campaigns.remove(&id).is_some();
        if removed {
            self.transactions.remove(&id);
        }
        Ok(removed)
    }

    async fn increment(&self, id: Uuid, kind: EngagementKind) -> CampaignResult<Option<Campaign>> {
        Ok(self.campaigns.get_mut(&id).map(|mut entry| {
            let c = entry.value_mut();
            match kind {
                EngagementKind::Impression => c.impressions += 1,
                EngagementKind::Click => c.clicks += 1,
            }
            c.clone()
        }))
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        patch: &StatusPatch,
    ) -> CampaignResult<CasOutcome> {
        let Some(mut entry) = self.campaigns.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        let c = entry.value_mut();
        if c.status != expected {
            debug!(
                campaign_id = %id,
                expected = %expected,
                actual = %c.status,
                "Status CAS conflict"
            );
            return Ok(CasOutcome::Conflict(c.status));
        }
        patch.apply_to(c);
        c.updated_at = Utc::now();
        Ok(CasOutcome::Applied(c.clone()))
    }

    async fn record_transaction(
        &self,
        campaign_id: Uuid,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> CampaignResult<()> {
        let mut txns = self.transactions.entry(campaign_id).or_default();
        match txns.iter_mut().find(|(id, _)| *id == transaction_id) {
            Some(existing) => existing.1 = status,
            None => txns.push((transaction_id, status)),
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campaign_core::types::AdType;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn campaign(status: CampaignStatus) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            title: "Autumn promo".into(),
            ad_type: AdType::Inline,
            position: None,
            image_url: "https://cdn.example.com/p.png".into(),
            target_link: "https://example.com".into(),
            price: Decimal::from(75),
            is_paid: status == CampaignStatus::Active,
            status,
            rejection_reason: None,
            start_date: now - Duration::days(2),
            end_date: now + Duration::days(5),
            impressions: 0,
            clicks: 0,
            owner_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn paused_patch() -> StatusPatch {
        StatusPatch { status: CampaignStatus::Paused, is_paid: true, rejection_reason: None }
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let c = campaign(CampaignStatus::Active);
        store.create(&c).await.unwrap();
        let id = c.id;

        let mut handles = Vec::new();
        for _ in 0..1000 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment(id, EngagementKind::Impression).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get(id).await.unwrap().unwrap().impressions, 1000);
    }

    #[tokio::test]
    async fn test_edit_rechecks_merged_dates() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Active);
        store.create(&c).await.unwrap();

        // each edit is valid against the original record on its own
        let shorten = UpdateCampaign {
            end_date: Some(c.start_date + Duration::days(2)),
            ..Default::default()
        };
        let push_start = UpdateCampaign {
            start_date: Some(c.start_date + Duration::days(5)),
            ..Default::default()
        };
        assert!(matches!(
            store.update(c.id, CampaignStatus::Active, &shorten).await.unwrap(),
            CasOutcome::Applied(_)
        ));
        let res = store.update(c.id, CampaignStatus::Active, &push_start).await;
        assert!(matches!(res, Err(CampaignError::InvalidRange(_))));

        let stored = store.get(c.id).await.unwrap().unwrap();
        assert!(stored.end_date > stored.start_date);
        assert_eq!(stored.start_date, c.start_date);
    }

    #[tokio::test]
    async fn test_edit_conflicts_on_status_change() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Expired);
        store.create(&c).await.unwrap();

        let edit = UpdateCampaign { title: Some("Late edit".into()), ..Default::default() };
        assert_eq!(
            store.update(c.id, CampaignStatus::Active, &edit).await.unwrap(),
            CasOutcome::Conflict(CampaignStatus::Expired)
        );
        assert_eq!(store.get(c.id).await.unwrap().unwrap().title, "Autumn promo");
        assert_eq!(
            store.update(Uuid::new_v4(), CampaignStatus::Active, &edit).await.unwrap(),
            CasOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_increment_missing_campaign() {
        let store = MemoryStore::new();
        assert!(store.increment(Uuid::new_v4(), EngagementKind::Click).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cas_conflict_leaves_record_alone() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Paused);
        store.create(&c).await.unwrap();

        let patch = paused_patch();
        let outcome = store
            .compare_and_set_status(c.id, CampaignStatus::Active, &patch)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict(CampaignStatus::Paused));

        let missing = store
            .compare_and_set_status(Uuid::new_v4(), CampaignStatus::Active, &patch)
            .await
            .unwrap();
        assert_eq!(missing, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn test_cas_preserves_counters() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Active);
        store.create(&c).await.unwrap();
        store.increment(c.id, EngagementKind::Click).await.unwrap();

        let patch = paused_patch();
        match store.compare_and_set_status(c.id, CampaignStatus::Active, &patch).await.unwrap() {
            CasOutcome::Applied(updated) => {
                assert_eq!(updated.status, CampaignStatus::Paused);
                assert_eq!(updated.clicks, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_blocked_by_live_transaction() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Pending);
        store.create(&c).await.unwrap();
        let txn = Uuid::new_v4();
        store.record_transaction(c.id, txn, TransactionStatus::Pending).await.unwrap();

        assert!(matches!(store.delete(c.id).await, Err(CampaignError::DeleteBlocked(_))));

        store.record_transaction(c.id, txn, TransactionStatus::Failed).await.unwrap();
        assert!(store.delete(c.id).await.unwrap());
        assert!(store.get(c.id).await.unwrap().is_none());
        assert!(!store.delete(c.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_overdue() {
        let store = MemoryStore::new();
        let mut overdue = campaign(CampaignStatus::Active);
        overdue.end_date = Utc::now() - Duration::hours(1);
        let live = campaign(CampaignStatus::Active);
        let mut rejected = campaign(CampaignStatus::Rejected);
        rejected.end_date = Utc::now() - Duration::hours(1);
        for c in [&overdue, &live, &rejected] {
            store.create(c).await.unwrap();
        }
        let found = store.find_overdue(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, overdue.id);
    }
}

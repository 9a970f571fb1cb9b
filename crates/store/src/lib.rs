#![warn(clippy::unwrap_used)]

//! Campaign persistence.
//!
//! The engine holds no locks of its own: per-record atomicity comes from the
//! store (`increment`, `compare_and_set_status`), so several engine
//! processes can share one backend.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{
    Campaign, CampaignStatus, EngagementKind, SlotFilter, StatusPatch, UpdateCampaign,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Result of a status-conditional write (status change or field edit).
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Applied(Campaign),
    /// The stored status differed from the expected one.
    Conflict(CampaignStatus),
    Missing,
}

/// Payment transaction state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Pending and succeeded transactions pin a campaign against deletion.
    pub fn blocks_delete(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Succeeded)
    }
}

/// Apply `edit` to a copy of `current` and check the merged date range.
pub(crate) fn merged_edit(current: &Campaign, edit: &UpdateCampaign) -> CampaignResult<Campaign> {
    let mut next = current.clone();
    edit.apply_to(&mut next);
    if next.end_date <= next.start_date {
        return Err(CampaignError::InvalidRange(
            "end date must be after start date".to_string(),
        ));
    }
    next.updated_at = Utc::now();
    Ok(next)
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Campaigns matching a slot filter, in a stable order.
    async fn find_eligible(&self, filter: &SlotFilter) -> CampaignResult<Vec<Campaign>>;

    async fn get(&self, id: Uuid) -> CampaignResult<Option<Campaign>>;

    async fn list_by_owner(&self, owner_id: Uuid) -> CampaignResult<Vec<Campaign>>;

    /// ACTIVE or PAUSED campaigns whose end date is before `now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> CampaignResult<Vec<Campaign>>;

    async fn create(&self, campaign: &Campaign) -> CampaignResult<()>;

    /// Apply a field edit only if the stored status still equals
    /// `expected`. The merged dates are checked inside the same atomic
    /// step and fail with `InvalidRange` when `end_date <= start_date`.
    /// Status and counters are untouched.
    async fn update(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        edit: &UpdateCampaign,
    ) -> CampaignResult<CasOutcome>;

    /// Remove a campaign. Fails with `DeleteBlocked` while a pending or
    /// succeeded transaction is attached. Returns false if absent.
    async fn delete(&self, id: Uuid) -> CampaignResult<bool>;

    /// Atomically add one to a counter and return the updated record.
    async fn increment(&self, id: Uuid, kind: EngagementKind) -> CampaignResult<Option<Campaign>>;

    /// Write `patch` only if the stored status still equals `expected`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        patch: &StatusPatch,
    ) -> CampaignResult<CasOutcome>;

    async fn record_transaction(
        &self,
        campaign_id: Uuid,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> CampaignResult<()>;
}

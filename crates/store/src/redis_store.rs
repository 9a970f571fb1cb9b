//! Redis-backed campaign store shared by every engine process.
//!
//! Each campaign is a hash. `body` holds the JSON record; `status`,
//! `is_paid`, `rejection_reason`, `impressions` and `clicks` are separate
//! fields and override whatever `body` says. Counter increments and status
//! compare-and-set run as Lua scripts, so they are atomic per record.

use crate::{merged_edit, CampaignStore, CasOutcome, TransactionStatus};
use async_trait::async_trait;
use campaign_core::config::StoreConfig;
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::{
    Campaign, CampaignStatus, EngagementKind, SlotFilter, StatusPatch, UpdateCampaign,
};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

const INCREMENT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return nil
end
redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
return redis.call('HGETALL', KEYS[1])
";

const CAS_STATUS_SCRIPT: &str = r"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return {'missing'}
end
if current ~= ARGV[1] then
  return {'conflict', current}
end
redis.call('HSET', KEYS[1],
    'status', ARGV[2], 'is_paid', ARGV[3],
    'rejection_reason', ARGV[4], 'updated_at', ARGV[5])
return {'applied'}
";

// Writes the new body only while both the status and the body the caller
// read are still in place, so a concurrent edit or delete forces a re-read.
const EDIT_SCRIPT: &str = r"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return {'missing'}
end
if current ~= ARGV[1] then
  return {'conflict', current}
end
if redis.call('HGET', KEYS[1], 'body') ~= ARGV[2] then
  return {'stale'}
end
redis.call('HSET', KEYS[1], 'body', ARGV[3], 'updated_at', ARGV[4])
return {'applied'}
";

const EDIT_ATTEMPTS: usize = 5;

pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
    increment: redis::Script,
    cas_status: redis::Script,
    edit: redis::Script,
}

fn storage(e: redis::RedisError) -> CampaignError {
    CampaignError::Storage(e.to_string())
}

impl RedisStore {
    pub async fn connect(config: &StoreConfig) -> CampaignResult<Self> {
        info!(url = %config.redis_url, "Connecting to Redis campaign store");

        let client = redis::Client::open(config.redis_url.as_str()).map_err(storage)?;
        let mut conn = ConnectionManager::new(client).await.map_err(storage)?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(storage)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            conn,
            prefix: config.key_prefix.clone(),
            increment: redis::Script::new(INCREMENT_SCRIPT),
            cas_status: redis::Script::new(CAS_STATUS_SCRIPT),
            edit: redis::Script::new(EDIT_SCRIPT),
        })
    }

    fn campaign_key(&self, id: Uuid) -> String {
        format!("{}:campaign:{id}", self.prefix)
    }

    fn index_key(&self) -> String {
        format!("{}:campaigns", self.prefix)
    }

    fn owner_key(&self, owner_id: Uuid) -> String {
        format!("{}:owner:{owner_id}:campaigns", self.prefix)
    }

    fn transactions_key(&self, id: Uuid) -> String {
        format!("{}:campaign:{id}:txns", self.prefix)
    }

    fn encode(campaign: &Campaign) -> CampaignResult<Vec<(&'static str, String)>> {
        Ok(vec![
            ("body", serde_json::to_string(campaign)?),
            ("status", campaign.status.as_str().to_string()),
            ("is_paid", flag(campaign.is_paid)),
            ("rejection_reason", campaign.rejection_reason.clone().unwrap_or_default()),
            ("impressions", campaign.impressions.to_string()),
            ("clicks", campaign.clicks.to_string()),
        ])
    }

    fn decode(fields: HashMap<String, String>) -> CampaignResult<Option<Campaign>> {
        let Some(body) = fields.get("body") else {
            return Ok(None);
        };
        let mut campaign: Campaign = serde_json::from_str(body)?;
        if let Some(status) = fields.get("status").and_then(|s| CampaignStatus::parse(s)) {
            campaign.status = status;
        }
        if let Some(paid) = fields.get("is_paid") {
            campaign.is_paid = paid == "1";
        }
        campaign.rejection_reason = fields
            .get("rejection_reason")
            .filter(|r| !r.is_empty())
            .cloned();
        campaign.impressions = counter(&fields, "impressions");
        campaign.clicks = counter(&fields, "clicks");
        if let Some(ts) = fields
            .get("updated_at")
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        {
            campaign.updated_at = ts.with_timezone(&Utc);
        }
        Ok(Some(campaign))
    }

    async fn load_many(&self, ids: Vec<String>) -> CampaignResult<Vec<Campaign>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(format!("{}:campaign:{id}", self.prefix));
        }
        let mut conn = self.conn.clone();
        let rows: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(storage)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(c) = Self::decode(row)? {
                out.push(c);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn load_all(&self) -> CampaignResult<Vec<Campaign>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.index_key()).await.map_err(storage)?;
        self.load_many(ids).await
    }
}

fn flag(b: bool) -> String {
    String::from(if b { "1" } else { "0" })
}

fn parse_status(raw: Option<&String>) -> CampaignResult<CampaignStatus> {
    raw.and_then(|s| CampaignStatus::parse(s))
        .ok_or_else(|| CampaignError::Storage("unreadable stored status".into()))
}

fn counter(fields: &HashMap<String, String>, name: &str) -> u64 {
    fields.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[async_trait]
impl CampaignStore for RedisStore {
    // Full scan of the campaign index; the live catalogue is small.
    async fn find_eligible(&self, filter: &SlotFilter) -> CampaignResult<Vec<Campaign>> {
        let mut all = self.load_all().await?;
        all.retain(|c| filter.matches(c));
        Ok(all)
    }

    async fn get(&self, id: Uuid) -> CampaignResult<Option<Campaign>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> =
            conn.hgetall(self.campaign_key(id)).await.map_err(storage)?;
        Self::decode(fields)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> CampaignResult<Vec<Campaign>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.owner_key(owner_id)).await.map_err(storage)?;
        self.load_many(ids).await
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> CampaignResult<Vec<Campaign>> {
        let mut all = self.load_all().await?;
        all.retain(|c| {
            matches!(c.status, CampaignStatus::Active | CampaignStatus::Paused) && c.end_date < now
        });
        Ok(all)
    }

    async fn create(&self, campaign: &Campaign) -> CampaignResult<()> {
        let fields = Self::encode(campaign)?;
        let id = campaign.id.to_string();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(self.campaign_key(campaign.id), fields.as_slice())
            .ignore()
            .sadd(self.index_key(), &id)
            .ignore()
            .sadd(self.owner_key(campaign.owner_id), &id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage)?;
        debug!(campaign_id = %campaign.id, "Campaign stored");
        Ok(())
    }

    // Rewrites `body` with an optimistic check on the body that was read;
    // status and counters live in their own fields.
    async fn update(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        edit: &UpdateCampaign,
    ) -> CampaignResult<CasOutcome> {
        let key = self.campaign_key(id);
        let mut conn = self.conn.clone();

        for _ in 0..EDIT_ATTEMPTS {
            let fields: HashMap<String, String> = conn.hgetall(&key).await.map_err(storage)?;
            let Some(read_body) = fields.get("body").cloned() else {
                return Ok(CasOutcome::Missing);
            };
            let Some(current) = Self::decode(fields)? else {
                return Ok(CasOutcome::Missing);
            };
            if current.status != expected {
                return Ok(CasOutcome::Conflict(current.status));
            }
            let next = merged_edit(&current, edit)?;

            let reply: Vec<String> = self
                .edit
                .key(&key)
                .arg(expected.as_str())
                .arg(&read_body)
                .arg(serde_json::to_string(&next)?)
                .arg(next.updated_at.to_rfc3339())
                .invoke_async(&mut conn)
                .await
                .map_err(storage)?;

            match reply.first().map(String::as_str) {
                Some("applied") => return Ok(CasOutcome::Applied(next)),
                Some("stale") => {
                    debug!(campaign_id = %id, "Concurrent edit detected, re-reading");
                    continue;
                }
                Some("conflict") => {
                    let actual = parse_status(reply.get(1))?;
                    debug!(
                        campaign_id = %id,
                        expected = %expected,
                        actual = %actual,
                        "Edit CAS conflict"
                    );
                    return Ok(CasOutcome::Conflict(actual));
                }
                _ => return Ok(CasOutcome::Missing),
            }
        }

        Err(CampaignError::InvalidState(
            "campaign is being edited concurrently".to_string(),
        ))
    }

    async fn delete(&self, id: Uuid) -> CampaignResult<bool> {
        let mut conn = self.conn.clone();
        let txns: Vec<String> = conn.hvals(self.transactions_key(id)).await.map_err(storage)?;
        let blocked = txns.iter().any(|s| {
            s == TransactionStatus::Pending.as_str() || s == TransactionStatus::Succeeded.as_str()
        });
        if blocked {
            return Err(CampaignError::DeleteBlocked(
                "campaign has pending or completed payments".to_string(),
            ));
        }

        let Some(campaign) = self.get(id).await? else {
            return Ok(false);
        };
        let member = id.to_string();
        redis::pipe()
            .atomic()
            .del(self.campaign_key(id))
            .ignore()
            .del(self.transactions_key(id))
            .ignore()
            .srem(self.index_key(), &member)
            .ignore()
            .srem(self.owner_key(campaign.owner_id), &member)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage)?;
        Ok(true)
    }

    async fn increment(&self, id: Uuid, kind: EngagementKind) -> CampaignResult<Option<Campaign>> {
        let mut conn = self.conn.clone();
        let fields: Option<HashMap<String, String>> = self
            .increment
            .key(self.campaign_key(id))
            .arg(kind.field())
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;
        match fields {
            Some(fields) => Self::decode(fields),
            None => Ok(None),
        }
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        patch: &StatusPatch,
    ) -> CampaignResult<CasOutcome> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .cas_status
            .key(self.campaign_key(id))
            .arg(expected.as_str())
            .arg(patch.status.as_str())
            .arg(flag(patch.is_paid))
            .arg(patch.rejection_reason.clone().unwrap_or_default())
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;

        match reply.first().map(String::as_str) {
            Some("applied") => match self.get(id).await? {
                Some(c) => Ok(CasOutcome::Applied(c)),
                None => Ok(CasOutcome::Missing),
            },
            Some("conflict") => {
                let actual = parse_status(reply.get(1))?;
                debug!(
                    campaign_id = %id,
                    expected = %expected,
                    actual = %actual,
                    "Status CAS conflict"
                );
                Ok(CasOutcome::Conflict(actual))
            }
            _ => Ok(CasOutcome::Missing),
        }
    }

    async fn record_transaction(
        &self,
        campaign_id: Uuid,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> CampaignResult<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(
            self.transactions_key(campaign_id),
            transaction_id.to_string(),
            status.as_str(),
        )
        .await
        .map_err(storage)
    }
}

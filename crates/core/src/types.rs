use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ─── Campaign ──────────────────────────────────────────────────────────────

/// A single advertiser's ad record.
///
/// `status == Active` implies `is_paid`; `end_date > start_date`. Counters
/// are independent of each other, so `clicks` may exceed `impressions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    /// Free-form placement tag. `None` means "derive from type".
    #[serde(default)]
    pub position: Option<String>,
    pub image_url: String,
    pub target_link: String,
    pub price: Decimal,
    pub is_paid: bool,
    pub status: CampaignStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn has_position(&self) -> bool {
        self.position.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && self.end_date >= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdType {
    BannerTop,
    BannerSide,
    Inline,
    Footer,
    Slider,
    Ticker,
    Popup,
    Sticky,
}

impl AdType {
    pub const ALL: [AdType; 8] = [
        AdType::BannerTop,
        AdType::BannerSide,
        AdType::Inline,
        AdType::Footer,
        AdType::Slider,
        AdType::Ticker,
        AdType::Popup,
        AdType::Sticky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::BannerTop => "BANNER_TOP",
            AdType::BannerSide => "BANNER_SIDE",
            AdType::Inline => "INLINE",
            AdType::Footer => "FOOTER",
            AdType::Slider => "SLIDER",
            AdType::Ticker => "TICKER",
            AdType::Popup => "POPUP",
            AdType::Sticky => "STICKY",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Pending,
    Active,
    Paused,
    Expired,
    Rejected,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "PENDING",
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Expired => "EXPIRED",
            CampaignStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(CampaignStatus::Pending),
            "ACTIVE" => Some(CampaignStatus::Active),
            "PAUSED" => Some(CampaignStatus::Paused),
            "EXPIRED" => Some(CampaignStatus::Expired),
            "REJECTED" => Some(CampaignStatus::Rejected),
            _ => None,
        }
    }

    /// No lifecycle event leads out of a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Expired | CampaignStatus::Rejected)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Actors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    Advertiser,
    /// Trusted service callers such as the payment gateway.
    System,
}

/// The principal performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn admin(id: Uuid) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn advertiser(id: Uuid) -> Self {
        Self { id, role: Role::Advertiser }
    }

    pub fn system() -> Self {
        Self { id: Uuid::nil(), role: Role::System }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner (as advertiser) or admin.
    pub fn can_manage(&self, campaign: &Campaign) -> bool {
        self.is_admin() || self.owns(campaign.owner_id)
    }

    pub fn owns(&self, owner_id: Uuid) -> bool {
        self.role == Role::Advertiser && self.id == owner_id
    }
}

// ─── Slot filter ───────────────────────────────────────────────────────────

/// Eligibility predicate the store applies to pick candidates for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotFilter {
    pub status: CampaignStatus,
    pub now: DateTime<Utc>,
    pub allowed_types: BTreeSet<AdType>,
    pub allowed_positions: BTreeSet<String>,
}

impl SlotFilter {
    pub fn matches(&self, campaign: &Campaign) -> bool {
        if campaign.status != self.status || !campaign.is_running_at(self.now) {
            return false;
        }
        match campaign.position.as_deref() {
            Some(p) if !p.is_empty() => self.allowed_positions.contains(p),
            _ => self.allowed_types.contains(&campaign.ad_type),
        }
    }
}

// ─── Operation inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaign {
    pub title: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    #[serde(default)]
    pub position: Option<String>,
    pub image_url: String,
    pub target_link: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Admin-only hand-set price.
    #[serde(default)]
    pub price_override: Option<Decimal>,
    /// Admin-only: create on behalf of an advertiser.
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

/// Partial edit. Status, payment and counters are not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaign {
    pub title: Option<String>,
    pub position: Option<String>,
    pub image_url: Option<String>,
    pub target_link: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl UpdateCampaign {
    pub fn apply_to(&self, c: &mut Campaign) {
        if let Some(title) = &self.title {
            c.title = title.clone();
        }
        if let Some(position) = &self.position {
            c.position = normalize_position(Some(position));
        }
        if let Some(url) = &self.image_url {
            c.image_url = url.clone();
        }
        if let Some(link) = &self.target_link {
            c.target_link = link.clone();
        }
        if let Some(start) = self.start_date {
            c.start_date = start;
        }
        if let Some(end) = self.end_date {
            c.end_date = end;
        }
    }
}

/// Canonical form of a placement tag or slot name: trimmed, upper-case.
/// Stored positions and slot lookups both go through it, so matching is
/// case-insensitive for callers.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn normalize_position(position: Option<&String>) -> Option<String> {
    position
        .map(|p| normalize_tag(p))
        .filter(|p| !p.is_empty())
}

/// Fields a lifecycle transition may change, written together with the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPatch {
    pub status: CampaignStatus,
    pub is_paid: bool,
    pub rejection_reason: Option<String>,
}

impl StatusPatch {
    pub fn of(campaign: &Campaign) -> Self {
        Self {
            status: campaign.status,
            is_paid: campaign.is_paid,
            rejection_reason: campaign.rejection_reason.clone(),
        }
    }

    pub fn apply_to(&self, c: &mut Campaign) {
        c.status = self.status;
        c.is_paid = self.is_paid;
        c.rejection_reason = self.rejection_reason.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Impression,
    Click,
}

impl EngagementKind {
    /// Name of the persisted counter field.
    pub fn field(&self) -> &'static str {
        match self {
            EngagementKind::Impression => "impressions",
            EngagementKind::Click => "clicks",
        }
    }
}

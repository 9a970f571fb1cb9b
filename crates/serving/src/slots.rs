//! Page slot → eligible ad types and placement tags.
//!
//! Each slot lists the legacy type-only tags it accepts alongside the newer
//! position tags, so older campaigns without a position keep serving.

use campaign_core::types::{normalize_tag, AdType, CampaignStatus, SlotFilter};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

static SLOT_TYPES: &[(&str, &[AdType])] = &[
    ("HEADER", &[AdType::BannerTop, AdType::Slider]),
    ("TOP_BANNER", &[AdType::BannerTop]),
    ("SIDEBAR", &[AdType::BannerSide, AdType::Sticky]),
    ("INLINE", &[AdType::Inline]),
    ("FOOTER", &[AdType::Footer, AdType::Sticky]),
    ("MID_PAGE", &[AdType::Inline, AdType::Slider]),
    ("BETWEEN_SECTIONS", &[AdType::Inline, AdType::Ticker, AdType::Slider]),
    ("MOBILE", &[AdType::Sticky, AdType::Popup]),
];

static SLOT_POSITIONS: &[(&str, &[&str])] = &[
    ("HEADER", &["HEADER", "TOP"]),
    ("TOP_BANNER", &["TOP_BANNER", "HEADER"]),
    ("SIDEBAR", &["SIDEBAR", "RIGHT_SIDEBAR"]),
    ("INLINE", &["INLINE", "IN_ARTICLE"]),
    ("FOOTER", &["FOOTER"]),
    ("MID_PAGE", &["MID_PAGE", "INLINE"]),
    ("BETWEEN_SECTIONS", &["BETWEEN_SECTIONS", "MID_PAGE"]),
    ("MOBILE", &["MOBILE", "MOBILE_STICKY", "FOOTER"]),
];

/// What a slot accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRule {
    pub allowed_types: BTreeSet<AdType>,
    pub allowed_positions: BTreeSet<String>,
}

/// Stateless resolver over the static slot tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotResolver;

impl SlotResolver {
    /// Unknown slots get no types and their own name as the only position.
    /// Slot names are matched in their normalized (upper-case) form, the
    /// same form positions are stored in.
    pub fn resolve(&self, slot: &str) -> SlotRule {
        let slot = normalize_tag(slot);
        let slot = slot.as_str();
        let types = SLOT_TYPES
            .iter()
            .find(|(name, _)| *name == slot)
            .map(|(_, types)| types.iter().copied().collect())
            .unwrap_or_default();
        let positions = SLOT_POSITIONS
            .iter()
            .find(|(name, _)| *name == slot)
            .map(|(_, positions)| positions.iter().map(|p| p.to_string()).collect())
            .unwrap_or_else(|| BTreeSet::from([slot.to_string()]));
        SlotRule {
            allowed_types: types,
            allowed_positions: positions,
        }
    }

    pub fn resolve_filter(&self, slot: &str, now: DateTime<Utc>) -> SlotFilter {
        let rule = self.resolve(slot);
        SlotFilter {
            status: CampaignStatus::Active,
            now,
            allowed_types: rule.allowed_types,
            allowed_positions: rule.allowed_positions,
        }
    }

    pub fn known_slots(&self) -> impl Iterator<Item = &'static str> {
        SLOT_TYPES.iter().map(|(name, _)| *name)
    }
}

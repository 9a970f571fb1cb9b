//! Engagement counting, CTR and dashboard roll-ups, plus the ClickHouse
//! collector that receives impression/click events.

pub mod aggregator;
pub mod counter;
pub mod logger;

pub use aggregator::{AdvertiserSummary, AnalyticsAggregator, CampaignMetrics};
pub use counter::{ctr, EngagementCounter};
pub use logger::ClickHouseCollector;

use crate::types::AdType;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables
/// with the prefix `AD_ENGINE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_min_duration_days")]
    pub min_duration_days: i64,
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: i64,
    #[serde(default)]
    pub rates: RateTable,
}

/// Daily rate per ad type. One field per type so each can be overridden
/// individually, e.g. `AD_ENGINE__PRICING__RATES__POPUP=75`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateTable {
    #[serde(default = "default_rate_banner_top")]
    pub banner_top: Decimal,
    #[serde(default = "default_rate_banner_side")]
    pub banner_side: Decimal,
    #[serde(default = "default_rate_inline")]
    pub inline: Decimal,
    #[serde(default = "default_rate_footer")]
    pub footer: Decimal,
    #[serde(default = "default_rate_slider")]
    pub slider: Decimal,
    #[serde(default = "default_rate_ticker")]
    pub ticker: Decimal,
    #[serde(default = "default_rate_popup")]
    pub popup: Decimal,
    #[serde(default = "default_rate_sticky")]
    pub sticky: Decimal,
}

impl RateTable {
    pub fn rate_per_day(&self, ad_type: AdType) -> Decimal {
        match ad_type {
            AdType::BannerTop => self.banner_top,
            AdType::BannerSide => self.banner_side,
            AdType::Inline => self.inline,
            AdType::Footer => self.footer,
            AdType::Slider => self.slider,
            AdType::Ticker => self.ticker,
            AdType::Popup => self.popup,
            AdType::Sticky => self.sticky,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Carousel size used when the caller does not pass a limit.
    #[serde(default = "default_carousel_limit")]
    pub default_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Seconds between sweeps that expire overdue campaigns.
    #[serde(default = "default_expiry_sweep_secs")]
    pub expiry_sweep_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_enabled")]
    pub enabled: bool,
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_enabled")]
    pub enabled: bool,
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_payment_subject")]
    pub payment_subject: String,
    #[serde(default = "default_notification_prefix")]
    pub notification_prefix: String,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_min_duration_days() -> i64 {
    1
}
fn default_max_duration_days() -> i64 {
    365
}
fn default_rate_banner_top() -> Decimal {
    Decimal::from(50)
}
fn default_rate_banner_side() -> Decimal {
    Decimal::from(30)
}
fn default_rate_inline() -> Decimal {
    Decimal::from(25)
}
fn default_rate_footer() -> Decimal {
    Decimal::from(15)
}
fn default_rate_slider() -> Decimal {
    Decimal::from(40)
}
fn default_rate_ticker() -> Decimal {
    Decimal::from(10)
}
fn default_rate_popup() -> Decimal {
    Decimal::from(60)
}
fn default_rate_sticky() -> Decimal {
    Decimal::from(35)
}
fn default_carousel_limit() -> usize {
    5
}
fn default_expiry_sweep_secs() -> u64 {
    60
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_key_prefix() -> String {
    "ads".to_string()
}
fn default_clickhouse_enabled() -> bool {
    false
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "ad_engine".to_string()
}
fn default_batch_size() -> usize {
    10000
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_nats_enabled() -> bool {
    false
}
fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_payment_subject() -> String {
    "payments.succeeded".to_string()
}
fn default_notification_prefix() -> String {
    "notifications.campaign".to_string()
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            min_duration_days: default_min_duration_days(),
            max_duration_days: default_max_duration_days(),
            rates: RateTable::default(),
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            banner_top: default_rate_banner_top(),
            banner_side: default_rate_banner_side(),
            inline: default_rate_inline(),
            footer: default_rate_footer(),
            slider: default_rate_slider(),
            ticker: default_rate_ticker(),
            popup: default_rate_popup(),
            sticky: default_rate_sticky(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_carousel_limit(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_secs: default_expiry_sweep_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            enabled: default_clickhouse_enabled(),
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_nats_enabled(),
            urls: default_nats_urls(),
            payment_subject: default_payment_subject(),
            notification_prefix: default_notification_prefix(),
            max_reconnects: default_nats_max_reconnects(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            pricing: PricingConfig::default(),
            rotation: RotationConfig::default(),
            lifecycle: LifecycleConfig::default(),
            store: StoreConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            nats: NatsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("AD_ENGINE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let p = &self.pricing;
        if p.min_duration_days < 1 || p.max_duration_days < p.min_duration_days {
            return Err(config::ConfigError::Message(format!(
                "invalid pricing duration bounds: min={} max={}",
                p.min_duration_days, p.max_duration_days
            )));
        }
        if self.lifecycle.expiry_sweep_secs == 0 {
            return Err(config::ConfigError::Message(
                "lifecycle.expiry_sweep_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

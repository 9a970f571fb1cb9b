//! Ad server: campaign serving and lifecycle engine.
//!
//! Wires the configured store, analytics collector and NATS transports into
//! an [`AdEngine`], runs the payment consumer and the periodic expiry sweep,
//! and exports metrics until shut down.

use std::net::SocketAddr;
use std::sync::Arc;

use campaign_analytics::ClickHouseCollector;
use campaign_core::config::{AppConfig, StoreBackend};
use campaign_core::event_bus::{noop_sink, AnalyticsCollector, Notifier};
use campaign_engine::{AdEngine, NatsNotifier, PaymentConsumer};
use campaign_store::{CampaignStore, MemoryStore, RedisStore};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ad-server")]
#[command(about = "Campaign serving and lifecycle engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "AD_ENGINE__NODE_ID")]
    node_id: Option<String>,

    /// Store backend: memory or redis (overrides config)
    #[arg(long, env = "AD_ENGINE__STORE__BACKEND")]
    store: Option<String>,

    /// Metrics port (overrides config)
    #[arg(long, env = "AD_ENGINE__METRICS__PORT")]
    metrics_port: Option<u16>,
}

fn parse_backend(raw: &str) -> anyhow::Result<StoreBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(StoreBackend::Memory),
        "redis" => Ok(StoreBackend::Redis),
        other => anyhow::bail!("unknown store backend '{other}', expected memory or redis"),
    }
}

fn start_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.metrics.host.parse()?, config.metrics.port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(port = config.metrics.port, "Metrics exporter started");
    Ok(())
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CampaignStore>> {
    let store: Arc<dyn CampaignStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory campaign store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store).await?),
    };
    Ok(store)
}

async fn open_collector(config: &AppConfig) -> Arc<dyn AnalyticsCollector> {
    if !config.clickhouse.enabled {
        info!("ClickHouse disabled, engagement events are not exported");
        return noop_sink();
    }
    match ClickHouseCollector::new(&config.clickhouse, config.node_id.clone()).await {
        Ok(collector) => Arc::new(collector),
        Err(e) => {
            error!(error = %e, "Failed to connect to ClickHouse, engagement export disabled");
            noop_sink()
        }
    }
}

async fn connect_nats(config: &AppConfig) -> Option<async_nats::Client> {
    if !config.nats.enabled {
        info!("NATS disabled, notifications and payment events are off");
        return None;
    }
    let urls = config.nats.urls.join(",");
    info!(urls = %urls, "Connecting to NATS");
    match async_nats::ConnectOptions::new()
        .max_reconnects(Some(config.nats.max_reconnects))
        .connect(urls.as_str())
        .await
    {
        Ok(client) => {
            info!("NATS connection established");
            Some(client)
        }
        Err(e) => {
            error!(
                error = %e,
                "Failed to connect to NATS, notifications and payment events are off"
            );
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ad_server=info,campaign_engine=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Ad server starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(raw) = cli.store.as_deref() {
        config.store.backend = parse_backend(raw)?;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        store = ?config.store.backend,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    if let Err(e) = start_metrics(&config) {
        error!(error = %e, "Failed to start metrics exporter");
    }

    let store = open_store(&config).await?;
    let collector = open_collector(&config).await;
    let nats = connect_nats(&config).await;

    let notifier: Arc<dyn Notifier> = match &nats {
        Some(client) => Arc::new(NatsNotifier::new(
            client.clone(),
            config.nats.notification_prefix.clone(),
        )),
        None => noop_sink(),
    };

    let engine = AdEngine::new(&config, store, notifier, collector);

    if let Some(client) = nats {
        PaymentConsumer::new(engine.clone()).spawn(client, config.nats.payment_subject.clone());
    }

    let sweeper = engine.clone();
    let sweep_every = std::time::Duration::from_secs(config.lifecycle.expiry_sweep_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.expire_overdue(chrono::Utc::now()).await {
                error!(error = %e, "Expiry sweep failed");
            }
        }
    });

    info!("Ad server is ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("Redis").ok(), Some(StoreBackend::Redis));
        assert_eq!(parse_backend(" memory ").ok(), Some(StoreBackend::Memory));
        assert!(parse_backend("postgres").is_err());
    }
}

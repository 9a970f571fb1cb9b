//! Engagement event collector that batches rows into ClickHouse.
//! Submission is a non-blocking channel send; a background task owns the client.

use async_trait::async_trait;
use campaign_core::config::ClickHouseConfig;
use campaign_core::event_bus::AnalyticsCollector;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 100_000;
const TABLE: &str = "ad_engagement_events";

#[derive(Debug, Clone, PartialEq, Serialize)]
struct EngagementRow {
    event_id: Uuid,
    event_type: &'static str,
    campaign_id: Uuid,
    title: String,
    node_id: String,
    timestamp: String,
}

impl EngagementRow {
    fn new(
        event_type: &'static str,
        campaign_id: Uuid,
        title: &str,
        node_id: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            campaign_id,
            title: title.to_string(),
            node_id: node_id.to_string(),
            timestamp: at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }
}

/// `?` is a bind placeholder in the client's query builder, so it must not
/// appear literally in inlined rows. Outside string values JSON never
/// contains it, and the unicode escape is read back as the same character.
fn encode_row(row: &EngagementRow) -> serde_json::Result<String> {
    Ok(serde_json::to_string(row)?.replace('?', "\\u003f"))
}

/// Analytics collector with a background batch writer.
pub struct ClickHouseCollector {
    sender: mpsc::Sender<EngagementRow>,
    node_id: String,
}

impl ClickHouseCollector {
    /// Connect, verify the schema and spawn the background writer.
    pub async fn new(config: &ClickHouseConfig, node_id: String) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<EngagementRow>(CHANNEL_CAPACITY);

        let writer = BatchWriter::new(config).await?;
        let batch_size = config.batch_size.max(1);
        let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms);

        tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!(table = TABLE, "Engagement collector initialized with ClickHouse backend");

        Ok(Self { sender, node_id })
    }

    fn enqueue(
        &self,
        event_type: &'static str,
        campaign_id: Uuid,
        title: &str,
    ) -> anyhow::Result<()> {
        let row = EngagementRow::new(event_type, campaign_id, title, &self.node_id, Utc::now());
        match self.sender.try_send(row) {
            Ok(()) => {
                metrics::counter!("analytics.queued").increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("analytics.dropped").increment(1);
                warn!(campaign_id = %campaign_id, "Engagement event dropped: {}", e);
                Err(anyhow::anyhow!("engagement event dropped: {e}"))
            }
        }
    }
}

#[async_trait]
impl AnalyticsCollector for ClickHouseCollector {
    async fn track_impression(&self, campaign_id: Uuid, title: &str) -> anyhow::Result<()> {
        self.enqueue("impression", campaign_id, title)
    }

    async fn track_click(&self, campaign_id: Uuid, title: &str) -> anyhow::Result<()> {
        self.enqueue("click", campaign_id, title)
    }
}

struct BatchWriter {
    client: clickhouse::Client,
}

impl BatchWriter {
    async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        Self::ensure_schema(&client).await?;

        Ok(Self { client })
    }

    async fn ensure_schema(client: &clickhouse::Client) -> anyhow::Result<()> {
        client
            .query(
                "CREATE TABLE IF NOT EXISTS ad_engagement_events (
                    event_id UUID,
                    event_type LowCardinality(String),
                    campaign_id UUID,
                    title String,
                    node_id String,
                    timestamp DateTime64(3)
                ) ENGINE = MergeTree()
                ORDER BY (campaign_id, timestamp)
                PARTITION BY toYYYYMM(timestamp)
                TTL toDateTime(timestamp) + INTERVAL 180 DAY",
            )
            .execute()
            .await?;

        info!("ClickHouse engagement schema verified");
        Ok(())
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<EngagementRow>,
        batch_size: usize,
        flush_interval: std::time::Duration,
    ) {
        let mut buffer: Vec<EngagementRow> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(row) => {
                        buffer.push(row);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            self.flush(&mut buffer).await;
                        }
                        info!("Engagement collector channel closed, writer stopping");
                        return;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<EngagementRow>) {
        let count = buffer.len();
        debug!(count = count, "Flushing engagement batch to ClickHouse");

        let rows: Vec<String> = buffer.iter().filter_map(|r| encode_row(r).ok()).collect();
        buffer.clear();
        if rows.is_empty() {
            return;
        }

        let insert_sql = format!("INSERT INTO {TABLE} FORMAT JSONEachRow {}", rows.join("\n"));

        match self.client.query(&insert_sql).execute().await {
            Ok(_) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Engagement batch flushed");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush engagement batch");
            }
        }
    }
}

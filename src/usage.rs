//! Usage logging: total tokens per successful request, keyed by user and tenant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub tenant_id: String,
    pub provider: String,
    pub model: String,
    pub total_tokens: usize,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> Result<()>;
}

/// Emits each record as a structured log event.
#[derive(Debug, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        info!(
            target: "parley::usage",
            user_id = %record.user_id,
            tenant_id = %record.tenant_id,
            provider = %record.provider,
            model = %record.model,
            total_tokens = record.total_tokens,
            "Token usage"
        );
        Ok(())
    }
}

/// Appends one JSON line per record.
pub struct JsonlUsageSink {
    path: PathBuf,
}

impl JsonlUsageSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UsageSink for JsonlUsageSink {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Record in the background. A failing sink is logged and otherwise ignored.
pub fn spawn_record(sink: Arc<dyn UsageSink>, record: UsageRecord) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.record(&record).await {
            warn!("Failed to record usage for {}: {}", record.user_id, e);
        }
    })
}

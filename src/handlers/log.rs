//! Log Handler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Channel, CommunicationLog, DeliveryStatus, LogFilter};
use crate::services::DeliveryLogger;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub queue_id: Option<String>,
    pub tenant_id: Option<String>,
    pub channel: Option<String>,
    pub status: Option<String>,
    pub recipient: Option<String>,
    pub provider: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LogEntryResponse {
    pub id: String,
    pub queue_id: String,
    pub attempt: u32,
    pub tenant_id: String,
    pub channel: String,
    pub provider: String,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct LogStatsResponse {
    pub total_sent: u64,
    pub total_failed: u64,
    pub success_rate: f64,
    /// Channel name to `(sent, failed)`
    pub by_channel: BTreeMap<String, (u64, u64)>,
}

/// Log handler
pub struct LogHandler {
    logger: Arc<DeliveryLogger>,
}

impl LogHandler {
    pub fn new(logger: Arc<DeliveryLogger>) -> Self {
        Self { logger }
    }

    /// Query logs, newest first
    pub async fn query(&self, query: LogQuery) -> Result<Vec<LogEntryResponse>, String> {
        let filter = LogFilter {
            queue_id: query.queue_id.map(|s| Uuid::parse_str(&s)).transpose().map_err(|e| e.to_string())?,
            tenant_id: query.tenant_id,
            channel: query.channel.map(|c| c.parse::<Channel>()).transpose()?,
            status: query.status.map(|s| Self::parse_status(&s)).transpose()?,
            recipient: query.recipient,
            provider: query.provider,
            from_date: query.from_date.as_deref().map(parse_date).transpose()?,
            to_date: query.to_date.as_deref().map(parse_date).transpose()?,
            limit: query.limit.unwrap_or(50).min(1000),
            offset: query.offset.unwrap_or(0),
        };

        let logs = self.logger.query(&filter).await.map_err(|e| e.to_string())?;
        Ok(logs.iter().map(Self::to_response).collect())
    }

    /// All attempts of one queue entry
    pub async fn for_queue(&self, queue_id: &str) -> Result<Vec<LogEntryResponse>, String> {
        let uuid = Uuid::parse_str(queue_id).map_err(|e| e.to_string())?;
        let logs = self.logger.for_queue(uuid).await.map_err(|e| e.to_string())?;
        Ok(logs.iter().map(Self::to_response).collect())
    }

    /// Get recent logs
    pub async fn recent(&self, limit: u32) -> Result<Vec<LogEntryResponse>, String> {
        let logs = self.logger.recent(limit).await.map_err(|e| e.to_string())?;
        Ok(logs.iter().map(Self::to_response).collect())
    }

    /// Get statistics
    pub async fn stats(
        &self,
        tenant_id: Option<&str>,
        from_date: Option<String>,
        to_date: Option<String>,
    ) -> Result<LogStatsResponse, String> {
        let from = from_date.as_deref().map(parse_date).transpose()?;
        let to = to_date.as_deref().map(parse_date).transpose()?;

        let stats = self.logger.stats(tenant_id, from, to).await.map_err(|e| e.to_string())?;

        Ok(LogStatsResponse {
            total_sent: stats.total_sent,
            total_failed: stats.total_failed,
            success_rate: stats.success_rate,
            by_channel: stats
                .by_channel
                .iter()
                .map(|(channel, counts)| (channel.to_string(), (counts.sent, counts.failed)))
                .collect(),
        })
    }

    fn parse_status(s: &str) -> Result<DeliveryStatus, String> {
        match s.trim().to_lowercase().as_str() {
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" | "error" => Ok(DeliveryStatus::Failed),
            other => Err(format!("Unknown delivery status: {}", other)),
        }
    }

    fn to_response(entry: &CommunicationLog) -> LogEntryResponse {
        LogEntryResponse {
            id: entry.id.to_string(),
            queue_id: entry.queue_id.to_string(),
            attempt: entry.attempt,
            tenant_id: entry.tenant_id.clone(),
            channel: entry.channel.to_string(),
            provider: entry.provider.clone(),
            recipient: entry.recipient.clone(),
            subject: entry.subject.clone(),
            status: entry.status.to_string(),
            external_id: entry.external_id.clone(),
            error: entry.error.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("Invalid date {}: {}", s, e))
}

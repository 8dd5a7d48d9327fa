//! Queue Handler

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Channel, QueueEntry, QueueFilter, QueueStatus};
use crate::services::{CommunicationService, ProcessResult};

#[derive(Debug, Default, Deserialize)]
pub struct QueueListQuery {
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    pub channel: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueueEntryResponse {
    pub id: String,
    pub tenant_id: String,
    pub channel: String,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub priority: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub scheduled_for: String,
    pub next_attempt_at: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub pending: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
    pub retry_scheduled: u64,
    pub success_rate: f64,
}

/// Queue handler
pub struct QueueHandler {
    comms: Arc<CommunicationService>,
}

impl QueueHandler {
    pub fn new(comms: Arc<CommunicationService>) -> Self {
        Self { comms }
    }

    /// List queue entries
    pub async fn list(&self, query: QueueListQuery) -> Result<Vec<QueueEntryResponse>, String> {
        let filter = QueueFilter {
            tenant_id: query.tenant_id,
            status: query.status.map(|s| s.parse::<QueueStatus>()).transpose()?,
            channel: query.channel.map(|c| c.parse::<Channel>()).transpose()?,
            limit: query.limit.unwrap_or(50).min(500),
            offset: query.offset.unwrap_or(0),
        };

        let entries = self.comms.queue().list(&filter).await.map_err(|e| e.to_string())?;
        Ok(entries.iter().map(Self::to_response).collect())
    }

    /// Get queue entry
    pub async fn get(&self, id: &str) -> Result<QueueEntryResponse, String> {
        let uuid = Uuid::parse_str(id).map_err(|e| e.to_string())?;
        let entry = self.comms.queue().get(uuid).await.map_err(|e| e.to_string())?;
        Ok(Self::to_response(&entry))
    }

    /// Get queue statistics
    pub async fn stats(&self, tenant_id: Option<&str>) -> Result<QueueStatsResponse, String> {
        let stats = self.comms.queue().stats(tenant_id).await.map_err(|e| e.to_string())?;

        Ok(QueueStatsResponse {
            pending: stats.pending,
            sending: stats.sending,
            sent: stats.sent,
            failed: stats.failed,
            retry_scheduled: stats.retry_scheduled,
            success_rate: stats.success_rate,
        })
    }

    /// Queue a fresh copy of a failed entry
    pub async fn requeue(&self, id: &str) -> Result<QueueEntryResponse, String> {
        let uuid = Uuid::parse_str(id).map_err(|e| e.to_string())?;
        let copy = self.comms.queue().requeue(uuid).await.map_err(|e| e.to_string())?;
        Ok(Self::to_response(&copy))
    }

    /// Dispatch due entries
    pub async fn process(&self, limit: Option<usize>) -> Result<ProcessResult, String> {
        self.comms
            .process_due(limit.unwrap_or(100))
            .await
            .map_err(|e| e.to_string())
    }

    fn to_response(entry: &QueueEntry) -> QueueEntryResponse {
        QueueEntryResponse {
            id: entry.id.to_string(),
            tenant_id: entry.tenant_id.clone(),
            channel: entry.channel.to_string(),
            recipient: entry.recipient.clone(),
            subject: entry.subject.clone(),
            status: entry.status.to_string(),
            priority: entry.priority.to_string(),
            attempts: entry.attempts,
            max_attempts: entry.max_attempts,
            last_error: entry.last_error.clone(),
            external_id: entry.external_id.clone(),
            provider: entry.provider.clone(),
            scheduled_for: entry.scheduled_for.to_rfc3339(),
            next_attempt_at: entry.next_attempt_at.map(|t| t.to_rfc3339()),
            sent_at: entry.sent_at.map(|t| t.to_rfc3339()),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

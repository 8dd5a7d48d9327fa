//! Communication Log Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{Channel, QueueEntry};

/// Outcome recorded for a dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Append-only audit record, one per dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationLog {
    /// Log entry ID
    pub id: Uuid,
    /// Queue entry this attempt belongs to
    pub queue_id: Uuid,
    /// Attempt number on the queue entry
    pub attempt: u32,
    pub tenant_id: String,
    pub channel: Channel,
    /// Provider name (resend, smtp, sms-gateway, whatsapp-cloud, ...)
    pub provider: String,
    pub recipient: String,
    pub subject: String,
    /// Content snapshot at dispatch time
    pub content: String,
    pub status: DeliveryStatus,
    /// Message ID from provider
    pub external_id: Option<String>,
    /// Error message if failed
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    /// Event timestamp
    pub created_at: DateTime<Utc>,
}

impl CommunicationLog {
    pub fn for_attempt(entry: &QueueEntry, status: DeliveryStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            queue_id: entry.id,
            attempt: entry.attempts,
            tenant_id: entry.tenant_id.clone(),
            channel: entry.channel,
            provider: String::new(),
            recipient: entry.recipient.clone(),
            subject: entry.subject.clone(),
            content: entry.content.clone(),
            status,
            external_id: None,
            error: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_provider(mut self, provider: &str, external_id: Option<&str>) -> Self {
        self.provider = provider.to_string();
        self.external_id = external_id.map(|s| s.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Natural dedup key
    pub fn attempt_key(&self) -> (Uuid, u32) {
        (self.queue_id, self.attempt)
    }
}

/// Log filter for queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    pub queue_id: Option<Uuid>,
    pub tenant_id: Option<String>,
    pub channel: Option<Channel>,
    pub status: Option<DeliveryStatus>,
    /// Substring match on recipient
    pub recipient: Option<String>,
    pub provider: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Pagination offset
    pub offset: u32,
    /// Page size
    pub limit: u32,
}

impl LogFilter {
    pub fn new() -> Self {
        Self {
            limit: 50,
            ..Default::default()
        }
    }

    pub fn for_queue(queue_id: Uuid) -> Self {
        Self {
            queue_id: Some(queue_id),
            limit: 100,
            ..Default::default()
        }
    }

    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            limit: 100,
            ..Default::default()
        }
    }

    pub fn failures() -> Self {
        Self {
            status: Some(DeliveryStatus::Failed),
            limit: 100,
            ..Default::default()
        }
    }

    pub fn matches(&self, log: &CommunicationLog) -> bool {
        if self.queue_id.is_some_and(|id| log.queue_id != id) {
            return false;
        }
        if self.tenant_id.as_ref().is_some_and(|t| &log.tenant_id != t) {
            return false;
        }
        if self.channel.is_some_and(|c| log.channel != c) {
            return false;
        }
        if self.status.is_some_and(|s| log.status != s) {
            return false;
        }
        if let Some(ref recipient) = self.recipient {
            if !log.recipient.to_lowercase().contains(&recipient.to_lowercase()) {
                return false;
            }
        }
        if self.provider.as_ref().is_some_and(|p| &log.provider != p) {
            return false;
        }
        if self.from_date.is_some_and(|from| log.created_at < from) {
            return false;
        }
        if self.to_date.is_some_and(|to| log.created_at > to) {
            return false;
        }
        true
    }
}

/// Per-channel counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub failed: u64,
}

/// Log statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub total_sent: u64,
    pub total_failed: u64,
    pub by_channel: BTreeMap<Channel, ChannelStats>,
    /// Success rate (percentage)
    pub success_rate: f64,
}

impl LogStats {
    pub fn record(&mut self, log: &CommunicationLog) {
        let channel = self.by_channel.entry(log.channel).or_default();
        match log.status {
            DeliveryStatus::Sent => {
                self.total_sent += 1;
                channel.sent += 1;
            }
            DeliveryStatus::Failed => {
                self.total_failed += 1;
                channel.failed += 1;
            }
        }
    }

    pub fn calculate_rates(&mut self) {
        let total = self.total_sent + self.total_failed;
        if total > 0 {
            self.success_rate = (self.total_sent as f64 / total as f64) * 100.0;
        }
    }
}

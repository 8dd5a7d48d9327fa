//! Delivery Logger
//!
//! Writes the audit row for every dispatch attempt and moves the queue entry
//! to its post-dispatch status.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::hooks;
use crate::models::{CommunicationLog, DeliveryStatus, LogFilter, LogStats, QueueEntry, QueueStatus};
use crate::services::dispatcher::DispatchResult;
use crate::services::queue::{QueueError, QueueService};
use crate::services::store::{LogStore, StoreError};

/// Log service error
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Log storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Delivery logger and log queries
pub struct DeliveryLogger {
    queue: Arc<QueueService>,
    store: Arc<dyn LogStore>,
}

impl DeliveryLogger {
    pub fn new(queue: Arc<QueueService>, store: Arc<dyn LogStore>) -> Self {
        Self { queue, store }
    }

    /// Record the outcome of the attempt `entry` was claimed for.
    ///
    /// Writes one log row per `(queue_id, attempt)` and then updates the queue
    /// entry: `sent` on success, `retry_scheduled` for a retryable failure with
    /// attempts left, `failed` otherwise. Calling it again for the same
    /// attempt changes nothing and returns the entry's current status, as does
    /// an outcome from a claim that expired and was taken by another attempt.
    pub async fn record_outcome(&self, entry: &QueueEntry, result: &DispatchResult) -> Result<QueueStatus, LogError> {
        let status = if result.success {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };

        let mut log = CommunicationLog::for_attempt(entry, status)
            .with_provider(&result.provider, result.external_id.as_deref())
            .with_metadata(serde_json::json!({
                "retryable": result.retryable,
                "max_attempts": entry.max_attempts,
            }));
        if let Some(err) = &result.error {
            log = log.with_error(err);
        }

        let written = match self.store.insert_once(&log).await {
            Ok(written) => written,
            Err(e) => {
                error!(queue_id = %entry.id, attempt = entry.attempts, error = %e, "failed to write communication log");
                return Err(e.into());
            }
        };

        let mut current = self.queue.get(entry.id).await?;
        if current.status != QueueStatus::Sending || current.attempts != entry.attempts {
            if !written {
                debug!(queue_id = %entry.id, attempt = entry.attempts, "outcome already recorded");
            }
            return Ok(current.status);
        }

        let now = Utc::now();
        let provider = result.provider.as_str();
        let error_text = result.error.as_deref().unwrap_or("unknown error");

        if result.success {
            current
                .mark_sent(provider, result.external_id.as_deref(), now)
                .map_err(QueueError::from)?;
        } else if result.retryable && current.can_retry() {
            let at = now + self.queue.retry_policy().get_delay(current.attempts);
            current
                .schedule_retry(provider, error_text, at, now)
                .map_err(QueueError::from)?;
        } else {
            current
                .mark_failed(provider, error_text, now)
                .map_err(QueueError::from)?;
        }

        self.queue.update(&current).await?;
        if let Some(hook) = hooks::for_outcome(current.status) {
            info!(
                target: hooks::TARGET,
                hook,
                queue_id = %current.id,
                tenant_id = %current.tenant_id,
                channel = %current.channel,
                attempt = current.attempts,
                status = %current.status,
                "dispatch outcome recorded"
            );
        }
        Ok(current.status)
    }

    /// Get logs with filter, newest first
    pub async fn query(&self, filter: &LogFilter) -> Result<Vec<CommunicationLog>, LogError> {
        Ok(self.store.query(filter).await?)
    }

    /// All attempts for a queue entry
    pub async fn for_queue(&self, queue_id: Uuid) -> Result<Vec<CommunicationLog>, LogError> {
        self.query(&LogFilter::for_queue(queue_id)).await
    }

    pub async fn for_tenant(&self, tenant_id: &str) -> Result<Vec<CommunicationLog>, LogError> {
        self.query(&LogFilter::for_tenant(tenant_id)).await
    }

    /// Get recent logs
    pub async fn recent(&self, limit: u32) -> Result<Vec<CommunicationLog>, LogError> {
        let filter = LogFilter {
            limit,
            ..Default::default()
        };
        self.query(&filter).await
    }

    pub async fn failures(&self, limit: u32) -> Result<Vec<CommunicationLog>, LogError> {
        let filter = LogFilter {
            limit,
            ..LogFilter::failures()
        };
        self.query(&filter).await
    }

    /// Sent and failed counts per channel
    pub async fn stats(
        &self,
        tenant_id: Option<&str>,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<LogStats, LogError> {
        let filter = LogFilter {
            tenant_id: tenant_id.map(|t| t.to_string()),
            from_date,
            to_date,
            limit: u32::MAX,
            ..Default::default()
        };

        let mut stats = LogStats::default();
        for log in self.query(&filter).await? {
            stats.record(&log);
        }
        stats.calculate_rates();
        Ok(stats)
    }
}

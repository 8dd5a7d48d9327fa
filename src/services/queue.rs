//! Outbound Queue Service
//!
//! A durable buffer between producers and the dispatcher. Nothing here
//! advances time; callers pick up due entries via [`QueueService::due`].

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::hooks;
use crate::models::{NewMessage, QueueEntry, QueueFilter, QueueStats, QueueStatus, RetryPolicy, TransitionError};
use crate::services::store::{QueueStore, StoreError};

/// Queue service error
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue entry not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("Invalid operation: {0}")]
    Invalid(String),
    #[error("Queue storage error: {0}")]
    Store(#[from] StoreError),
}

/// Queue service
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    retry_policy: RetryPolicy,
    claim_lease: Duration,
}

impl QueueService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
            claim_lease: Duration::seconds(300),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// How long a claim holds before an unfinished `sending` entry is due again
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Get retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Persist a new `pending` entry. Never waits on a provider.
    pub async fn enqueue(&self, message: NewMessage) -> Result<QueueEntry, QueueError> {
        if message.recipient.trim().is_empty() {
            return Err(QueueError::Invalid("Recipient is required".to_string()));
        }
        if message.content.trim().is_empty() {
            return Err(QueueError::Invalid("Message content is empty".to_string()));
        }

        let entry = QueueEntry::new(message, self.retry_policy.max_attempts);
        if let Err(e) = self.store.insert(&entry).await {
            error!(tenant_id = %entry.tenant_id, channel = %entry.channel, error = %e, "failed to enqueue message");
            return Err(e.into());
        }

        info!(
            target: hooks::TARGET,
            hook = hooks::QUEUED,
            queue_id = %entry.id,
            tenant_id = %entry.tenant_id,
            channel = %entry.channel,
            priority = %entry.priority,
            "message queued"
        );
        Ok(entry)
    }

    /// Get entry by ID
    pub async fn get(&self, id: Uuid) -> Result<QueueEntry, QueueError> {
        self.store.get(id).await?.ok_or(QueueError::NotFound(id))
    }

    /// Claim a due entry for dispatch. `None` if it is not claimable now.
    pub async fn claim(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self.store.claim(id, Utc::now(), self.claim_lease).await?)
    }

    /// Due entries in dispatch order
    pub async fn due(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.store.due(limit, Utc::now()).await?)
    }

    pub(crate) async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        if let Err(e) = self.store.update(entry).await {
            error!(queue_id = %entry.id, status = %entry.status, error = %e, "failed to update queue entry");
            return Err(e.into());
        }
        Ok(())
    }

    /// Queue a fresh copy of a failed entry. The failed entry is left untouched.
    pub async fn requeue(&self, id: Uuid) -> Result<QueueEntry, QueueError> {
        let original = self.get(id).await?;
        if original.status != QueueStatus::Failed {
            return Err(QueueError::Invalid(format!(
                "Only failed entries can be requeued, entry is {}",
                original.status
            )));
        }

        let copy = original.requeued();
        if let Err(e) = self.store.insert(&copy).await {
            error!(queue_id = %id, error = %e, "failed to requeue entry");
            return Err(e.into());
        }

        info!(
            target: hooks::TARGET,
            hook = hooks::QUEUED,
            queue_id = %copy.id,
            retry_of = %id,
            "entry requeued"
        );
        Ok(copy)
    }

    /// List entries
    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.store.list(filter).await?)
    }

    /// Get queue statistics
    pub async fn stats(&self, tenant_id: Option<&str>) -> Result<QueueStats, QueueError> {
        let filter = QueueFilter {
            tenant_id: tenant_id.map(|t| t.to_string()),
            ..QueueFilter::new()
        };
        Ok(self.store.stats(&filter).await?)
    }
}

//! Persistence and lookup collaborators
//!
//! The dispatch pipeline only talks to storage through these traits. The
//! in-memory implementation lives in [`crate::services::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    CommunicationLog, CommunicationSettings, Contact, Customer, LogFilter, Quote, QueueEntry,
    QueueFilter, QueueStats, Receivable, ReminderKind, TenantDomain,
};

/// Storage error
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Tenant settings and domain records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn communication_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<CommunicationSettings>, StoreError>;

    /// Primary active domain record of a tenant
    async fn primary_domain(&self, tenant_id: &str) -> Result<Option<TenantDomain>, StoreError>;
}

/// Outbound queue table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, entry: &QueueEntry) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, StoreError>;

    /// Replace a row by id
    async fn update(&self, entry: &QueueEntry) -> Result<(), StoreError>;

    /// Conditionally move a due row to `sending` and count the attempt. The
    /// claim holds until `now + lease`; a `sending` row past its lease is due
    /// again. Returns `None` when the row is not claimable (another worker won).
    async fn claim(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<Option<QueueEntry>, StoreError>;

    /// Due rows, highest priority first then oldest schedule
    async fn due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<QueueEntry>, StoreError>;

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError>;

    /// Status counts over rows matching the filter, pagination ignored
    async fn stats(&self, filter: &QueueFilter) -> Result<QueueStats, StoreError>;
}

/// Append-only communication log table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert unless a row with the same `(queue_id, attempt)` exists.
    /// Returns whether a row was written.
    async fn insert_once(&self, log: &CommunicationLog) -> Result<bool, StoreError>;

    /// Newest first
    async fn query(&self, filter: &LogFilter) -> Result<Vec<CommunicationLog>, StoreError>;
}

/// Business records read by the reminder job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusinessStore: Send + Sync {
    /// Quotes in `sent` status whose `valid_until` falls within `[from, to]`
    async fn sent_quotes_expiring(
        &self,
        tenant_id: Option<String>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Quote>, StoreError>;

    /// Open receivables due on or before the given date
    async fn receivables_due(
        &self,
        tenant_id: Option<String>,
        on_or_before: NaiveDate,
    ) -> Result<Vec<Receivable>, StoreError>;

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError>;

    async fn customer_contacts(&self, customer_id: Uuid) -> Result<Vec<Contact>, StoreError>;
}

/// Record of reminders already sent, per entity and kind
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderLedger: Send + Sync {
    /// Atomically mark the entity as reminded on `today` unless it was marked
    /// less than `cooldown_days` ago. Returns whether the mark was taken.
    async fn try_mark(
        &self,
        entity_id: Uuid,
        kind: ReminderKind,
        today: NaiveDate,
        cooldown_days: u32,
    ) -> Result<bool, StoreError>;

    /// Read-only variant of `try_mark`
    async fn is_marked(
        &self,
        entity_id: Uuid,
        kind: ReminderKind,
        today: NaiveDate,
        cooldown_days: u32,
    ) -> Result<bool, StoreError>;

    /// Drop a mark taken on `today`
    async fn release(&self, entity_id: Uuid, kind: ReminderKind, today: NaiveDate) -> Result<(), StoreError>;
}

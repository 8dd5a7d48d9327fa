//! In-memory store
//!
//! Implements every collaborator trait over `Arc<RwLock<..>>` maps. Used when
//! embedding the pipeline without a database and throughout the tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    CommunicationLog, CommunicationSettings, Contact, Customer, LogFilter, Quote, QuoteStatus,
    QueueEntry, QueueFilter, QueueStats, Receivable, ReminderKind, TenantDomain,
};
use crate::services::store::{
    BusinessStore, LogStore, QueueStore, ReminderLedger, SettingsStore, StoreError,
};

#[derive(Default)]
struct LogTable {
    rows: Vec<CommunicationLog>,
    keys: HashSet<(Uuid, u32)>,
}

/// In-memory implementation of all stores
#[derive(Default)]
pub struct MemoryStore {
    settings: Arc<RwLock<HashMap<String, CommunicationSettings>>>,
    domains: Arc<RwLock<HashMap<String, Vec<TenantDomain>>>>,
    queue: Arc<RwLock<HashMap<Uuid, QueueEntry>>>,
    logs: Arc<RwLock<LogTable>>,
    quotes: Arc<RwLock<Vec<Quote>>>,
    receivables: Arc<RwLock<Vec<Receivable>>>,
    customers: Arc<RwLock<HashMap<Uuid, Customer>>>,
    contacts: Arc<RwLock<Vec<Contact>>>,
    reminders: Arc<RwLock<HashMap<(Uuid, ReminderKind), NaiveDate>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_settings(&self, settings: CommunicationSettings) {
        let mut map = self.settings.write().await;
        map.insert(settings.tenant_id.clone(), settings);
    }

    pub async fn add_domain(&self, domain: TenantDomain) {
        let mut map = self.domains.write().await;
        map.entry(domain.tenant_id.clone()).or_default().push(domain);
    }

    pub async fn add_quote(&self, quote: Quote) {
        self.quotes.write().await.push(quote);
    }

    pub async fn add_receivable(&self, receivable: Receivable) {
        self.receivables.write().await.push(receivable);
    }

    pub async fn add_customer(&self, customer: Customer) {
        let mut map = self.customers.write().await;
        map.insert(customer.id, customer);
    }

    pub async fn add_contact(&self, contact: Contact) {
        self.contacts.write().await.push(contact);
    }

    /// All queue rows, oldest first
    pub async fn queue_entries(&self) -> Vec<QueueEntry> {
        let queue = self.queue.read().await;
        let mut entries: Vec<_> = queue.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// All log rows in insertion order
    pub async fn log_rows(&self) -> Vec<CommunicationLog> {
        self.logs.read().await.rows.clone()
    }
}

fn within_cooldown(marked: NaiveDate, today: NaiveDate, cooldown_days: u32) -> bool {
    let elapsed = (today - marked).num_days();
    elapsed >= 0 && elapsed < i64::from(cooldown_days)
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn communication_settings(
        &self,
        tenant_id: &str,
    ) -> Result<Option<CommunicationSettings>, StoreError> {
        let map = self.settings.read().await;
        Ok(map.get(tenant_id).cloned())
    }

    async fn primary_domain(&self, tenant_id: &str) -> Result<Option<TenantDomain>, StoreError> {
        let map = self.domains.read().await;
        Ok(map
            .get(tenant_id)
            .and_then(|domains| domains.iter().find(|d| d.is_primary && d.is_active))
            .cloned())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let mut queue = self.queue.write().await;
        if queue.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!("queue entry {} exists", entry.id)));
        }
        queue.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        let queue = self.queue.read().await;
        Ok(queue.get(&id).cloned())
    }

    async fn update(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let mut queue = self.queue.write().await;
        let slot = queue
            .get_mut(&entry.id)
            .ok_or_else(|| StoreError::NotFound(entry.id.to_string()))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>, lease: Duration) -> Result<Option<QueueEntry>, StoreError> {
        let mut queue = self.queue.write().await;
        let entry = queue
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !entry.is_due(now) || entry.begin_attempt(now, lease).is_err() {
            return Ok(None);
        }
        Ok(Some(entry.clone()))
    }

    async fn due(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<QueueEntry>, StoreError> {
        let queue = self.queue.read().await;

        let mut due: Vec<_> = queue.values().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.scheduled_for.cmp(&b.scheduled_for))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError> {
        let queue = self.queue.read().await;

        let mut entries: Vec<_> = queue.values().filter(|e| filter.matches(e)).cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries.into_iter().skip(filter.offset).take(filter.limit).collect())
    }

    async fn stats(&self, filter: &QueueFilter) -> Result<QueueStats, StoreError> {
        let queue = self.queue.read().await;

        let mut stats = QueueStats::default();
        for entry in queue.values().filter(|e| filter.matches(e)) {
            stats.record(entry.status);
        }
        stats.calculate_rates();
        Ok(stats)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn insert_once(&self, log: &CommunicationLog) -> Result<bool, StoreError> {
        let mut table = self.logs.write().await;
        if !table.keys.insert(log.attempt_key()) {
            return Ok(false);
        }
        table.rows.push(log.clone());
        Ok(true)
    }

    async fn query(&self, filter: &LogFilter) -> Result<Vec<CommunicationLog>, StoreError> {
        let table = self.logs.read().await;

        Ok(table
            .rows
            .iter()
            .rev()
            .filter(|log| filter.matches(log))
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BusinessStore for MemoryStore {
    async fn sent_quotes_expiring(
        &self,
        tenant_id: Option<String>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Quote>, StoreError> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .iter()
            .filter(|q| tenant_id.as_ref().map_or(true, |t| &q.tenant_id == t))
            .filter(|q| q.status == QuoteStatus::Sent)
            .filter(|q| q.valid_until >= from && q.valid_until <= to)
            .cloned()
            .collect())
    }

    async fn receivables_due(
        &self,
        tenant_id: Option<String>,
        on_or_before: NaiveDate,
    ) -> Result<Vec<Receivable>, StoreError> {
        let receivables = self.receivables.read().await;
        Ok(receivables
            .iter()
            .filter(|r| tenant_id.as_ref().map_or(true, |t| &r.tenant_id == t))
            .filter(|r| r.status.is_open() && r.due_date <= on_or_before)
            .cloned()
            .collect())
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id).cloned())
    }

    async fn customer_contacts(&self, customer_id: Uuid) -> Result<Vec<Contact>, StoreError> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .iter()
            .filter(|c| c.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReminderLedger for MemoryStore {
    async fn try_mark(
        &self,
        entity_id: Uuid,
        kind: ReminderKind,
        today: NaiveDate,
        cooldown_days: u32,
    ) -> Result<bool, StoreError> {
        let mut marks = self.reminders.write().await;
        if let Some(marked) = marks.get(&(entity_id, kind)) {
            if within_cooldown(*marked, today, cooldown_days) {
                return Ok(false);
            }
        }
        marks.insert((entity_id, kind), today);
        Ok(true)
    }

    async fn is_marked(
        &self,
        entity_id: Uuid,
        kind: ReminderKind,
        today: NaiveDate,
        cooldown_days: u32,
    ) -> Result<bool, StoreError> {
        let marks = self.reminders.read().await;
        Ok(marks
            .get(&(entity_id, kind))
            .is_some_and(|marked| within_cooldown(*marked, today, cooldown_days)))
    }

    async fn release(&self, entity_id: Uuid, kind: ReminderKind, today: NaiveDate) -> Result<(), StoreError> {
        let mut marks = self.reminders.write().await;
        if marks.get(&(entity_id, kind)) == Some(&today) {
            marks.remove(&(entity_id, kind));
        }
        Ok(())
    }
}

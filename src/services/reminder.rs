//! Scheduled Reminder Trigger
//!
//! Scans sent quotes about to expire and open receivables that are due, and
//! originates one reminder email per entity through the pipeline. A ledger
//! keyed by entity and reminder kind keeps repeated or overlapping runs from
//! notifying the same customer twice inside the cooldown window.
//!
//! Each run first re-dispatches due queue entries, so a reminder whose first
//! attempt was scheduled for retry goes out on the next trigger.

use chrono::{Days, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReminderConfig;
use crate::hooks;
use crate::models::{
    resolve_customer_email, Priority, QueueStatus, ReminderCandidate, ReminderKind, Variables,
};
use crate::services::communicator::CommunicationService;
use crate::services::store::{BusinessStore, ReminderLedger, StoreError};

pub const QUOTE_TEMPLATE: &str = "quote-expiry-reminder";
pub const INVOICE_TEMPLATE: &str = "invoice-due-reminder";

/// Reminder run error
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("Candidate lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Options for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderRunOptions {
    pub dry_run: bool,
    /// Restrict the run to one tenant
    pub tenant_id: Option<String>,
    /// Defaults to the current UTC date
    pub today: Option<NaiveDate>,
}

/// Counters reported by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunSummary {
    pub quotes_notified: u32,
    pub invoices_notified: u32,
    pub skipped_no_email: u32,
    pub skipped_already_reminded: u32,
    pub failed: u32,
    /// Due queue entries delivered by this run's re-dispatch pass
    pub redispatched_sent: u32,
    /// Due queue entries that failed again (terminal or rescheduled)
    pub redispatched_failed: u32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Notified(ReminderKind),
    NoEmail,
    AlreadyReminded,
    Failed,
}

/// Reminder job
pub struct ReminderService {
    comms: Arc<CommunicationService>,
    business: Arc<dyn BusinessStore>,
    ledger: Arc<dyn ReminderLedger>,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(
        comms: Arc<CommunicationService>,
        business: Arc<dyn BusinessStore>,
        ledger: Arc<dyn ReminderLedger>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            comms,
            business,
            ledger,
            config,
        }
    }

    /// Re-dispatch due queue entries, then run both reminder kinds once.
    /// Dry runs skip the re-dispatch pass.
    pub async fn run(&self, options: ReminderRunOptions) -> Result<ReminderRunSummary, ReminderError> {
        let mut summary = ReminderRunSummary {
            dry_run: options.dry_run,
            ..Default::default()
        };
        if !options.dry_run {
            self.redispatch_due(&mut summary).await;
        }

        let today = options.today.unwrap_or_else(|| Utc::now().date_naive());
        let window_end = today
            .checked_add_days(Days::new(u64::from(self.config.quote_window_days)))
            .unwrap_or(NaiveDate::MAX);

        let quotes = self
            .business
            .sent_quotes_expiring(options.tenant_id.clone(), today, window_end)
            .await?;
        let receivables = self
            .business
            .receivables_due(options.tenant_id.clone(), today)
            .await?;

        let candidates: Vec<ReminderCandidate> = quotes
            .iter()
            .map(ReminderCandidate::from)
            .chain(receivables.iter().map(ReminderCandidate::from))
            .collect();

        debug!(
            quotes = quotes.len(),
            invoices = receivables.len(),
            %today,
            dry_run = options.dry_run,
            "reminder candidates selected"
        );

        let outcomes: Vec<Outcome> = stream::iter(candidates)
            .map(|candidate| self.remind(candidate, today, options.dry_run))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Notified(ReminderKind::QuoteExpiry) => summary.quotes_notified += 1,
                Outcome::Notified(ReminderKind::InvoiceDue) => summary.invoices_notified += 1,
                Outcome::NoEmail => summary.skipped_no_email += 1,
                Outcome::AlreadyReminded => summary.skipped_already_reminded += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        info!(
            target: hooks::TARGET,
            hook = hooks::REMINDERS_RUN,
            quotes_notified = summary.quotes_notified,
            invoices_notified = summary.invoices_notified,
            skipped_no_email = summary.skipped_no_email,
            skipped_already_reminded = summary.skipped_already_reminded,
            failed = summary.failed,
            redispatched_sent = summary.redispatched_sent,
            redispatched_failed = summary.redispatched_failed,
            dry_run = summary.dry_run,
            "reminder run finished"
        );
        Ok(summary)
    }

    async fn redispatch_due(&self, summary: &mut ReminderRunSummary) {
        let limit = self.config.redispatch_limit;
        if limit == 0 {
            return;
        }

        match self.comms.process_due(limit).await {
            Ok(result) => {
                summary.redispatched_sent = count(result.sent);
                summary.redispatched_failed = count(result.failed + result.retried + result.errors.len());
            }
            // candidate scanning still runs; the entries stay due for the next trigger
            Err(e) => warn!(error = %e, "re-dispatch of due messages failed"),
        }
    }

    fn cooldown_days(&self, kind: ReminderKind) -> u32 {
        match kind {
            // a quote stays in the window for window_days + 1 runs
            ReminderKind::QuoteExpiry => self.config.quote_window_days + 1,
            ReminderKind::InvoiceDue => self.config.invoice_cooldown_days.max(1),
        }
    }

    async fn remind(&self, candidate: ReminderCandidate, today: NaiveDate, dry_run: bool) -> Outcome {
        let kind = candidate.kind;
        let entity_id = candidate.entity_id;
        let cooldown = self.cooldown_days(kind);

        let (email, customer_name) = match self.recipient(&candidate).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(%kind, %entity_id, "no customer email, reminder skipped");
                return Outcome::NoEmail;
            }
            Err(e) => {
                warn!(%kind, %entity_id, error = %e, "customer lookup failed");
                return Outcome::Failed;
            }
        };

        if dry_run {
            return match self.ledger.is_marked(entity_id, kind, today, cooldown).await {
                Ok(true) => Outcome::AlreadyReminded,
                Ok(false) => Outcome::Notified(kind),
                Err(e) => {
                    warn!(%kind, %entity_id, error = %e, "reminder ledger lookup failed");
                    Outcome::Failed
                }
            };
        }

        match self.ledger.try_mark(entity_id, kind, today, cooldown).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(%kind, %entity_id, "already reminded");
                return Outcome::AlreadyReminded;
            }
            Err(e) => {
                warn!(%kind, %entity_id, error = %e, "reminder ledger unavailable");
                return Outcome::Failed;
            }
        }

        let (template, priority) = match kind {
            ReminderKind::QuoteExpiry => (QUOTE_TEMPLATE, Priority::Medium),
            ReminderKind::InvoiceDue => (INVOICE_TEMPLATE, Priority::High),
        };
        let metadata = serde_json::json!({
            "reminder_kind": kind.as_str(),
            "entity_id": entity_id,
            "reference": candidate.reference,
        });

        let outcome = self
            .comms
            .send_enhanced_email(
                &candidate.tenant_id,
                &email,
                template,
                reminder_variables(&candidate, &customer_name),
                priority,
                metadata,
            )
            .await;

        if outcome.success {
            return Outcome::Notified(kind);
        }

        warn!(
            %kind,
            %entity_id,
            queue_id = ?outcome.queue_id,
            error = ?outcome.error,
            "reminder not delivered"
        );

        // A retry_scheduled entry will still go out; anything else is retried next run.
        if outcome.status != Some(QueueStatus::RetryScheduled) {
            if let Err(e) = self.ledger.release(entity_id, kind, today).await {
                warn!(%kind, %entity_id, error = %e, "failed to release reminder mark");
            }
        }
        Outcome::Failed
    }

    /// Customer email and display name
    async fn recipient(&self, candidate: &ReminderCandidate) -> Result<Option<(String, String)>, StoreError> {
        let Some(customer_id) = candidate.customer_id else {
            return Ok(None);
        };

        let customer = self.business.customer(customer_id).await?;
        let contacts = self.business.customer_contacts(customer_id).await?;

        let name = candidate
            .customer_name
            .clone()
            .or_else(|| customer.as_ref().map(|c| c.name.clone()))
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Customer".to_string());

        Ok(resolve_customer_email(customer.as_ref(), &contacts).map(|email| (email, name)))
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn reminder_variables(candidate: &ReminderCandidate, customer_name: &str) -> Variables {
    let date = candidate.date.format("%Y-%m-%d").to_string();
    let (reference_key, date_key) = match candidate.kind {
        ReminderKind::QuoteExpiry => ("quote_number", "valid_until"),
        ReminderKind::InvoiceDue => ("invoice_number", "due_date"),
    };

    [
        (reference_key, candidate.reference.clone()),
        (date_key, date),
        ("customer_name", customer_name.to_string()),
        ("amount", candidate.formatted_amount()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

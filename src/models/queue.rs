//! Outbound Queue Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Channel, Priority, Variables};

/// Queue entry lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be dispatched
    #[default]
    Pending,
    /// Claimed by a dispatcher
    Sending,
    /// Accepted by the provider
    Sent,
    /// Permanently failed
    Failed,
    /// Failed with a transient error, will be re-attempted
    RetryScheduled,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    /// Whether a dispatcher may claim an entry in this status
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::RetryScheduled)
    }

    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sending)
                | (Self::RetryScheduled, Self::Sending)
                | (Self::Sending, Self::Sent)
                | (Self::Sending, Self::Failed)
                | (Self::Sending, Self::RetryScheduled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::RetryScheduled => "retry_scheduled",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "retry_scheduled" | "failed_retryable" => Ok(Self::RetryScheduled),
            other => Err(format!("Unknown queue status: {}", other)),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid queue transition for {id}: {from} -> {to}")]
pub struct TransitionError {
    pub id: Uuid,
    pub from: QueueStatus,
    pub to: QueueStatus,
}

/// A resolved message ready to be persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub tenant_id: String,
    pub channel: Channel,
    pub template_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    /// Main body: HTML for email, plain text for phone channels
    pub content: String,
    /// Plain-text alternative for email
    pub text_content: Option<String>,
    pub variables: Variables,
    pub priority: Priority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Persisted outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue entry ID
    pub id: Uuid,
    pub tenant_id: String,
    pub channel: Channel,
    pub template_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub content: String,
    pub text_content: Option<String>,
    /// Variables used during resolution
    pub variables: Variables,
    pub priority: Priority,
    /// Earliest dispatch time
    pub scheduled_for: DateTime<Utc>,
    /// Current status
    pub status: QueueStatus,
    /// Number of dispatch attempts started
    pub attempts: u32,
    /// Maximum dispatch attempts
    pub max_attempts: u32,
    /// Next retry time; while `sending`, when the claim lease expires
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last error message
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Provider message id
    pub external_id: Option<String>,
    /// Provider that handled the last attempt
    pub provider: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(message: NewMessage, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id: message.tenant_id,
            channel: message.channel,
            template_id: message.template_id,
            recipient: message.recipient,
            subject: message.subject,
            content: message.content,
            text_content: message.text_content,
            variables: message.variables,
            priority: message.priority,
            scheduled_for: message.scheduled_for.unwrap_or(now),
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            next_attempt_at: None,
            last_error: None,
            sent_at: None,
            external_id: None,
            provider: None,
            metadata: message.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh pending copy of this entry. The original keeps its status.
    pub fn requeued(&self) -> Self {
        let mut metadata = match &self.metadata {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        metadata.insert("retry_of".to_string(), serde_json::Value::String(self.id.to_string()));

        Self::new(
            NewMessage {
                tenant_id: self.tenant_id.clone(),
                channel: self.channel,
                template_id: self.template_id,
                recipient: self.recipient.clone(),
                subject: self.subject.clone(),
                content: self.content.clone(),
                text_content: self.text_content.clone(),
                variables: self.variables.clone(),
                priority: self.priority,
                scheduled_for: None,
                metadata: serde_json::Value::Object(metadata),
            },
            self.max_attempts,
        )
    }

    /// Check if entry is ready to dispatch. A `sending` entry whose claim
    /// lease has run out counts as due again.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status == QueueStatus::Sending {
            return self.lease_expired(now);
        }
        self.status.is_claimable()
            && self.scheduled_for <= now
            && self.next_attempt_at.map_or(true, |t| t <= now)
    }

    fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_some_and(|t| t <= now)
    }

    /// Check if another attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    fn transition(&mut self, next: QueueStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Claim for dispatch, holding the claim until `now + lease`.
    ///
    /// A `sending` entry can be claimed again once its lease has expired,
    /// which covers a worker that died or failed to record its outcome. The
    /// earlier attempt may still have reached the provider, so delivery is at
    /// least once.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>, lease: chrono::Duration) -> Result<(), TransitionError> {
        if self.status == QueueStatus::Sending && self.lease_expired(now) {
            self.updated_at = now;
        } else {
            self.transition(QueueStatus::Sending, now)?;
        }
        self.attempts += 1;
        self.next_attempt_at = Some(now + lease);
        Ok(())
    }

    /// Mark as sent
    pub fn mark_sent(
        &mut self,
        provider: &str,
        external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(QueueStatus::Sent, now)?;
        self.next_attempt_at = None;
        self.sent_at = Some(now);
        self.external_id = external_id.map(|s| s.to_string());
        self.provider = Some(provider.to_string());
        self.last_error = None;
        Ok(())
    }

    /// Mark as permanently failed
    pub fn mark_failed(&mut self, provider: &str, error: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(QueueStatus::Failed, now)?;
        self.next_attempt_at = None;
        self.provider = Some(provider.to_string());
        self.last_error = Some(error.to_string());
        Ok(())
    }

    /// Park for another attempt at `at`
    pub fn schedule_retry(
        &mut self,
        provider: &str,
        error: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(QueueStatus::RetryScheduled, now)?;
        self.provider = Some(provider.to_string());
        self.last_error = Some(error.to_string());
        self.next_attempt_at = Some(at);
        Ok(())
    }
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueStats {
    pub pending: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
    pub retry_scheduled: u64,
    /// Sent over terminal entries (percentage)
    pub success_rate: f64,
}

impl QueueStats {
    pub fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Pending => self.pending += 1,
            QueueStatus::Sending => self.sending += 1,
            QueueStatus::Sent => self.sent += 1,
            QueueStatus::Failed => self.failed += 1,
            QueueStatus::RetryScheduled => self.retry_scheduled += 1,
        }
    }

    pub fn calculate_rates(&mut self) {
        let total = self.sent + self.failed;
        if total > 0 {
            self.success_rate = (self.sent as f64 / total as f64) * 100.0;
        }
    }
}

/// Queue listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilter {
    pub tenant_id: Option<String>,
    pub status: Option<QueueStatus>,
    pub channel: Option<Channel>,
    pub offset: usize,
    pub limit: usize,
}

impl QueueFilter {
    pub fn new() -> Self {
        Self {
            limit: 50,
            ..Default::default()
        }
    }

    pub fn by_status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new()
        }
    }

    pub fn matches(&self, entry: &QueueEntry) -> bool {
        self.tenant_id.as_ref().map_or(true, |t| &entry.tenant_id == t)
            && self.status.map_or(true, |s| entry.status == s)
            && self.channel.map_or(true, |c| entry.channel == c)
    }
}

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts
    pub max_attempts: u32,
    /// Initial delay in seconds
    pub initial_delay_secs: u64,
    /// Maximum delay in seconds
    pub max_delay_secs: u64,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_secs: 60,
            max_delay_secs: 3600,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after the given (1-based) attempt
    pub fn get_delay(&self, attempt: u32) -> chrono::Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let delay = (self.initial_delay_secs as f64 * self.multiplier.powi(exponent)) as u64;
        let delay = delay.min(self.max_delay_secs);
        chrono::Duration::seconds(delay as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn message() -> NewMessage {
        NewMessage {
            tenant_id: "t1".to_string(),
            channel: Channel::Email,
            template_id: None,
            recipient: "c@x.com".to_string(),
            subject: "Hello".to_string(),
            content: "<p>Hello</p>".to_string(),
            text_content: Some("Hello".to_string()),
            variables: HashMap::new(),
            priority: Priority::Medium,
            scheduled_for: None,
            metadata: serde_json::json!({ "source": "test" }),
        }
    }

    fn lease() -> chrono::Duration {
        chrono::Duration::seconds(300)
    }

    #[test]
    fn stale_claim_becomes_due_after_lease() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(message(), 3);
        entry.begin_attempt(now, lease()).unwrap();

        assert!(!entry.is_due(now + chrono::Duration::seconds(299)));
        assert!(entry.begin_attempt(now + chrono::Duration::seconds(299), lease()).is_err());

        let later = now + chrono::Duration::seconds(300);
        assert!(entry.is_due(later));
        entry.begin_attempt(later, lease()).unwrap();
        assert_eq!(entry.status, QueueStatus::Sending);
        assert_eq!(entry.attempts, 2);
        assert!(!entry.is_due(later));

        entry.mark_sent("resend", None, later).unwrap();
        assert!(entry.next_attempt_at.is_none());
        assert!(!entry.is_due(later + chrono::Duration::days(1)));
    }

    #[test]
    fn new_entry_is_pending_and_due() {
        let entry = QueueEntry::new(message(), 3);
        assert_eq!(entry.status, QueueStatus::Pending);
        assert!(entry.is_due(Utc::now()));
    }

    #[test]
    fn terminal_states_never_return_to_pending() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(message(), 3);
        entry.begin_attempt(now, lease()).unwrap();
        entry.mark_sent("resend", Some("msg_1"), now).unwrap();

        assert!(entry.begin_attempt(now, lease()).is_err());
        assert!(entry.mark_failed("resend", "boom", now).is_err());
        assert_eq!(entry.status, QueueStatus::Sent);

        for terminal in [QueueStatus::Sent, QueueStatus::Failed] {
            for next in [
                QueueStatus::Pending,
                QueueStatus::Sending,
                QueueStatus::RetryScheduled,
                QueueStatus::Sent,
                QueueStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn retry_scheduled_waits_for_next_attempt() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(message(), 3);
        entry.begin_attempt(now, lease()).unwrap();
        entry
            .schedule_retry("resend", "timeout", now + chrono::Duration::seconds(60), now)
            .unwrap();

        assert!(!entry.is_due(now));
        assert!(entry.is_due(now + chrono::Duration::seconds(61)));
        assert!(entry.can_retry());
    }

    #[test]
    fn requeue_creates_fresh_entry() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(message(), 3);
        entry.begin_attempt(now, lease()).unwrap();
        entry.mark_failed("resend", "rejected", now).unwrap();

        let copy = entry.requeued();
        assert_ne!(copy.id, entry.id);
        assert_eq!(copy.status, QueueStatus::Pending);
        assert_eq!(copy.attempts, 0);
        assert_eq!(copy.metadata["retry_of"], entry.id.to_string());
        assert_eq!(copy.metadata["source"], "test");
        assert_eq!(entry.status, QueueStatus::Failed);
    }

    #[test]
    fn retry_policy_backs_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.get_delay(1).num_seconds(), 60);
        assert_eq!(policy.get_delay(2).num_seconds(), 120);
        assert_eq!(policy.get_delay(3).num_seconds(), 240);
        assert_eq!(policy.get_delay(20).num_seconds(), 3600);
    }
}

//! Lifecycle hooks
//!
//! Each hook is emitted as an `info` event on the [`TARGET`] target with a
//! `hook` field naming it, so embedders can subscribe with an
//! `EnvFilter` directive such as `commdispatch::hooks=info` or a custom layer.

use crate::models::QueueStatus;

/// `tracing` target every hook event is emitted on
pub const TARGET: &str = "commdispatch::hooks";

pub const QUEUED: &str = "communication.queued";
pub const SENT: &str = "communication.sent";
pub const FAILED: &str = "communication.failed";
pub const RETRY_SCHEDULED: &str = "communication.retry_scheduled";
pub const REMINDERS_RUN: &str = "reminders.run";

pub const ALL: [&str; 5] = [QUEUED, SENT, FAILED, RETRY_SCHEDULED, REMINDERS_RUN];

/// Hook fired when a dispatch attempt leaves an entry in `status`
pub fn for_outcome(status: QueueStatus) -> Option<&'static str> {
    match status {
        QueueStatus::Sent => Some(SENT),
        QueueStatus::Failed => Some(FAILED),
        QueueStatus::RetryScheduled => Some(RETRY_SCHEDULED),
        QueueStatus::Pending | QueueStatus::Sending => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_post_dispatch_states_fire_outcome_hooks() {
        assert_eq!(for_outcome(QueueStatus::Sent), Some(SENT));
        assert_eq!(for_outcome(QueueStatus::Failed), Some(FAILED));
        assert_eq!(for_outcome(QueueStatus::RetryScheduled), Some(RETRY_SCHEDULED));
        assert_eq!(for_outcome(QueueStatus::Sending), None);
        assert_eq!(for_outcome(QueueStatus::Pending), None);
    }
}

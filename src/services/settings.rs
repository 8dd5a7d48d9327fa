//! Settings Gate
//!
//! Decides per tenant and channel whether a message may be sent at all.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::models::{Channel, CommunicationSettings, SendOutcome};
use crate::services::communicator::CommsError;
use crate::services::store::{SettingsStore, StoreError};

/// Settings gate error
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Tenant id is required")]
    MissingTenant,
    #[error("Settings lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Settings gate
pub struct SettingsGate {
    store: Arc<dyn SettingsStore>,
}

impl SettingsGate {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Stored settings for a tenant, if any
    pub async fn load(&self, tenant_id: &str) -> Result<Option<CommunicationSettings>, SettingsError> {
        if tenant_id.trim().is_empty() {
            return Err(SettingsError::MissingTenant);
        }
        Ok(self.store.communication_settings(tenant_id).await?)
    }

    /// Whether the tenant allows sending on `channel`.
    ///
    /// Never fails: missing settings or lookup errors yield the channel
    /// default (email on, SMS and WhatsApp off). A blank tenant id is denied.
    pub async fn is_channel_enabled(&self, tenant_id: &str, channel: Channel) -> bool {
        match self.load(tenant_id).await {
            Ok(Some(settings)) => settings.is_enabled(channel),
            Ok(None) => channel.default_enabled(),
            Err(SettingsError::MissingTenant) => {
                warn!(%channel, "settings check without tenant id");
                false
            }
            Err(e) => {
                warn!(tenant_id, %channel, error = %e, "falling back to channel default");
                channel.default_enabled()
            }
        }
    }

    /// Settings for credential lookup, defaults when absent or unreadable
    pub async fn settings_or_default(&self, tenant_id: &str) -> CommunicationSettings {
        match self.load(tenant_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => CommunicationSettings::defaults(tenant_id),
            Err(e) => {
                warn!(tenant_id, error = %e, "using default communication settings");
                CommunicationSettings::defaults(tenant_id)
            }
        }
    }

    /// Run `send_fn` only if the channel is enabled.
    ///
    /// A disabled channel returns a failure outcome without calling `send_fn`.
    /// Errors from `send_fn` are reported as failure outcomes.
    pub async fn send_with_settings_check<F, Fut>(
        &self,
        tenant_id: &str,
        channel: Channel,
        recipient: &str,
        send_fn: F,
    ) -> SendOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SendOutcome, CommsError>>,
    {
        if !self.is_channel_enabled(tenant_id, channel).await {
            debug!(tenant_id, %channel, recipient, "channel disabled, message not sent");
            return SendOutcome::disabled(channel);
        }

        match send_fn().await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_persistence() {
                    error!(tenant_id, %channel, recipient, error = %e, "send failed");
                } else {
                    warn!(tenant_id, %channel, recipient, error = %e, "send failed");
                }
                SendOutcome::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MockSettingsStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn gate_with(settings: Option<CommunicationSettings>) -> SettingsGate {
        let mut store = MockSettingsStore::new();
        store
            .expect_communication_settings()
            .returning(move |_| Ok(settings.clone()));
        SettingsGate::new(Arc::new(store))
    }

    #[tokio::test]
    async fn disabled_channel_never_invokes_send_fn() {
        let settings = CommunicationSettings::defaults("t1")
            .with_channel(Channel::Email, true)
            .with_channel(Channel::Whatsapp, false);
        let gate = gate_with(Some(settings));

        let called = AtomicBool::new(false);
        let outcome = gate
            .send_with_settings_check("t1", Channel::Whatsapp, "+15551234567", || async {
                called.store(true, Ordering::SeqCst);
                Ok(SendOutcome::failure("unreachable"))
            })
            .await;

        assert!(!called.load(Ordering::SeqCst));
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("whatsapp communication is disabled in business settings")
        );
    }

    #[tokio::test]
    async fn missing_settings_use_channel_defaults() {
        let gate = gate_with(None);
        assert!(gate.is_channel_enabled("t1", Channel::Email).await);
        assert!(!gate.is_channel_enabled("t1", Channel::Sms).await);
        assert!(!gate.is_channel_enabled("t1", Channel::Whatsapp).await);
    }

    #[tokio::test]
    async fn lookup_failure_falls_back_to_defaults() {
        let mut store = MockSettingsStore::new();
        store
            .expect_communication_settings()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
        let gate = SettingsGate::new(Arc::new(store));

        assert!(gate.is_channel_enabled("t1", Channel::Email).await);
        assert!(!gate.is_channel_enabled("t1", Channel::Sms).await);
        assert!(gate.settings_or_default("t1").await.email_notifications);
    }

    #[tokio::test]
    async fn blank_tenant_is_denied() {
        let gate = gate_with(None);
        assert!(!gate.is_channel_enabled("  ", Channel::Email).await);
    }

    #[tokio::test]
    async fn send_fn_errors_become_failures() {
        let gate = gate_with(None);
        let outcome = gate
            .send_with_settings_check("t1", Channel::Email, "c@x.com", || async {
                Err(CommsError::Invalid("no body".to_string()))
            })
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no body"));
    }
}

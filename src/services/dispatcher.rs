//! Provider Dispatcher
//!
//! Picks the provider for an entry's channel and makes a single, time-bounded
//! attempt. Provider failures never escape as errors; they come back as a
//! failed [`DispatchResult`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{CommsConfig, EmailProviderKind};
use crate::models::{Channel, ChannelCredentials, QueueEntry};
use crate::services::provider::{
    GatewayProvider, HttpEmailProvider, Provider, ProviderError, ProviderMessage,
};

/// Outcome of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
    /// Provider that handled the attempt
    pub provider: String,
    /// Whether the failure is transient
    pub retryable: bool,
}

impl DispatchResult {
    pub fn sent(provider: &str, external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
            provider: provider.to_string(),
            retryable: false,
        }
    }

    pub fn failed(provider: &str, error: &ProviderError) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.to_string()),
            provider: provider.to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// Permanent failure decided before any provider call
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(reason.into()),
            provider: "none".to_string(),
            retryable: false,
        }
    }
}

/// Channel to provider lookup table
pub struct Dispatcher {
    providers: HashMap<Channel, Arc<dyn Provider>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            timeout,
        }
    }

    /// Providers for all channels as configured
    pub fn from_config(config: &CommsConfig) -> Result<Self, ProviderError> {
        let email: Arc<dyn Provider> = match config.email.kind {
            EmailProviderKind::Http => Arc::new(HttpEmailProvider::new(&config.email)),
            EmailProviderKind::Smtp => smtp_provider(config)?,
        };

        Ok(Self::new(Duration::from_secs(config.dispatch.timeout_secs.max(1)))
            .with_provider(Channel::Email, email)
            .with_provider(Channel::Sms, Arc::new(GatewayProvider::sms(&config.sms)))
            .with_provider(Channel::Whatsapp, Arc::new(GatewayProvider::whatsapp(&config.whatsapp))))
    }

    pub fn with_provider(mut self, channel: Channel, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(channel, provider);
        self
    }

    pub fn provider_name(&self, channel: Channel) -> Option<&'static str> {
        self.providers.get(&channel).map(|p| p.name())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Make one attempt to deliver `entry`
    pub async fn dispatch(&self, entry: &QueueEntry, credentials: &ChannelCredentials) -> DispatchResult {
        let Some(provider) = self.providers.get(&entry.channel) else {
            let error = ProviderError::NoProvider(entry.channel);
            warn!(queue_id = %entry.id, channel = %entry.channel, "no provider configured");
            return DispatchResult::failed("none", &error);
        };

        let message = ProviderMessage::from_entry(entry, credentials);

        match tokio::time::timeout(self.timeout, provider.send(&message)).await {
            Ok(Ok(receipt)) => {
                debug!(
                    queue_id = %entry.id,
                    provider = provider.name(),
                    external_id = ?receipt.external_id,
                    "provider accepted message"
                );
                DispatchResult::sent(provider.name(), receipt.external_id)
            }
            Ok(Err(e)) => {
                warn!(queue_id = %entry.id, provider = provider.name(), error = %e, "provider call failed");
                DispatchResult::failed(provider.name(), &e)
            }
            Err(_) => {
                let e = ProviderError::Timeout(self.timeout.as_secs());
                warn!(queue_id = %entry.id, provider = provider.name(), error = %e, "provider call timed out");
                DispatchResult::failed(provider.name(), &e)
            }
        }
    }
}

#[cfg(feature = "smtp")]
fn smtp_provider(config: &CommsConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let smtp = config
        .email
        .smtp
        .as_ref()
        .ok_or_else(|| ProviderError::Configuration("email.kind is smtp but email.smtp is missing".to_string()))?;
    Ok(Arc::new(crate::services::provider::SmtpEmailProvider::new(
        smtp,
        config.email.default_from.clone(),
    )?))
}

#[cfg(not(feature = "smtp"))]
fn smtp_provider(_config: &CommsConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    Err(ProviderError::Configuration("built without the smtp feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMessage, Priority};
    use crate::services::provider::{MockProvider, ProviderReceipt};

    fn entry(channel: Channel) -> QueueEntry {
        QueueEntry::new(
            NewMessage {
                tenant_id: "t1".to_string(),
                channel,
                template_id: None,
                recipient: "c@x.com".to_string(),
                subject: "Hi".to_string(),
                content: "<p>Hi</p>".to_string(),
                text_content: Some("Hi".to_string()),
                variables: Default::default(),
                priority: Priority::Medium,
                scheduled_for: None,
                metadata: serde_json::Value::Null,
            },
            3,
        )
    }

    #[tokio::test]
    async fn routes_by_channel() {
        let mut email = MockProvider::new();
        email.expect_name().return_const("resend");
        email.expect_send().times(1).returning(|msg| {
            assert_eq!(msg.html.as_deref(), Some("<p>Hi</p>"));
            Ok(ProviderReceipt {
                external_id: Some("em_1".to_string()),
            })
        });
        let mut sms = MockProvider::new();
        sms.expect_name().return_const("sms-gateway");
        sms.expect_send().never();

        let dispatcher = Dispatcher::new(Duration::from_secs(5))
            .with_provider(Channel::Email, Arc::new(email))
            .with_provider(Channel::Sms, Arc::new(sms));

        let result = dispatcher
            .dispatch(&entry(Channel::Email), &ChannelCredentials::default())
            .await;
        assert_eq!(result, DispatchResult::sent("resend", Some("em_1".to_string())));
    }

    #[tokio::test]
    async fn provider_error_becomes_failed_result() {
        let mut email = MockProvider::new();
        email.expect_name().return_const("resend");
        email.expect_send().returning(|_| {
            Err(ProviderError::Http {
                status: 500,
                message: "internal error".to_string(),
            })
        });

        let dispatcher = Dispatcher::new(Duration::from_secs(5)).with_provider(Channel::Email, Arc::new(email));
        let result = dispatcher
            .dispatch(&entry(Channel::Email), &ChannelCredentials::default())
            .await;

        assert!(!result.success);
        assert!(result.retryable);
        assert_eq!(result.error.as_deref(), Some("provider returned 500: internal error"));
    }

    #[tokio::test]
    async fn missing_provider_is_permanent_failure() {
        let dispatcher = Dispatcher::new(Duration::from_secs(5));
        let result = dispatcher
            .dispatch(&entry(Channel::Whatsapp), &ChannelCredentials::default())
            .await;

        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(result.error.as_deref(), Some("no provider configured for whatsapp"));
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn send(&self, _message: &ProviderMessage) -> Result<ProviderReceipt, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ProviderReceipt::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let dispatcher = Dispatcher::new(Duration::from_secs(15)).with_provider(Channel::Email, Arc::new(SlowProvider));
        let result = dispatcher
            .dispatch(&entry(Channel::Email), &ChannelCredentials::default())
            .await;

        assert!(!result.success);
        assert!(result.retryable);
        assert_eq!(result.error.as_deref(), Some("provider timed out after 15s"));
    }

    #[test]
    fn builds_http_providers_from_default_config() {
        let dispatcher = Dispatcher::from_config(&CommsConfig::default()).unwrap();
        assert_eq!(dispatcher.provider_name(Channel::Email), Some("resend"));
        assert_eq!(dispatcher.provider_name(Channel::Sms), Some("sms-gateway"));
        assert_eq!(dispatcher.provider_name(Channel::Whatsapp), Some("whatsapp-cloud"));
        assert_eq!(dispatcher.timeout(), Duration::from_secs(15));
    }
}

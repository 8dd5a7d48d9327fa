//! Channel providers
//!
//! One implementation per delivery mechanism, selected by channel in the
//! [`Dispatcher`](crate::services::Dispatcher).

pub mod gateway;
pub mod http_email;
#[cfg(feature = "smtp")]
pub mod smtp;

pub use gateway::{GatewayKind, GatewayProvider};
pub use http_email::HttpEmailProvider;
#[cfg(feature = "smtp")]
pub use smtp::SmtpEmailProvider;

use async_trait::async_trait;

use crate::models::{Channel, ChannelCredentials, QueueEntry};

/// Provider error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("provider misconfigured: {0}")]
    Configuration(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider timed out after {0}s")]
    Timeout(u64),
    #[error("provider returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider rejected message: {0}")]
    Rejected(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("no provider configured for {0}")]
    NoProvider(Channel),
}

impl ProviderError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Message handed to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    pub channel: Channel,
    pub to: String,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    /// Tenant overrides, preferred over provider defaults
    pub credentials: ChannelCredentials,
}

impl ProviderMessage {
    pub fn from_entry(entry: &QueueEntry, credentials: &ChannelCredentials) -> Self {
        let (html, text) = if entry.channel.is_phone() {
            (None, Some(entry.content.clone()))
        } else if entry.text_content.as_deref() == Some(entry.content.as_str()) {
            (None, entry.text_content.clone())
        } else {
            (Some(entry.content.clone()), entry.text_content.clone())
        };

        Self {
            channel: entry.channel,
            to: entry.recipient.clone(),
            subject: entry.subject.clone(),
            html,
            text,
            credentials: credentials.clone(),
        }
    }
}

/// Provider acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReceipt {
    /// Provider message id
    pub external_id: Option<String>,
}

/// A delivery mechanism for one channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name recorded on queue and log rows
    fn name(&self) -> &'static str;

    async fn send(&self, message: &ProviderMessage) -> Result<ProviderReceipt, ProviderError>;
}

/// Shared HTTP client for provider APIs
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("commdispatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a provider HTTP response into its JSON body.
///
/// Non-2xx responses become `Http` errors carrying the provider's message.
/// A 2xx body carrying an `error` field is a rejection. An empty 2xx body is `Null`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;
    let json = serde_json::from_str::<serde_json::Value>(&body).ok();

    if !status.is_success() {
        let message = json
            .as_ref()
            .and_then(error_message)
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        });
    }

    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }

    let json = json.ok_or_else(|| ProviderError::MalformedResponse(truncate(&body, 200)))?;
    if json.get("error").is_some_and(|e| !e.is_null()) {
        let message = error_message(&json).unwrap_or_else(|| "unknown error".to_string());
        return Err(ProviderError::Rejected(message));
    }
    Ok(json)
}

/// `{error: {message}}`, `{error: "..."}` or `{message}`
fn error_message(body: &serde_json::Value) -> Option<String> {
    match body.get("error") {
        Some(serde_json::Value::Object(err)) => err
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string()),
        Some(serde_json::Value::String(err)) => Some(err.clone()),
        _ => body
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string()),
    }
}

/// String or numeric id at `value`
pub(crate) fn id_of(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMessage, Priority};
    use serde_json::json;

    #[test]
    fn retryability_follows_status() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::Timeout(15).is_retryable());
        assert!(ProviderError::Http { status: 503, message: "down".into() }.is_retryable());
        assert!(ProviderError::Http { status: 429, message: "slow down".into() }.is_retryable());
        assert!(!ProviderError::Http { status: 422, message: "bad".into() }.is_retryable());
        assert!(!ProviderError::MissingCredentials("api key".into()).is_retryable());
        assert!(!ProviderError::Rejected("blocked".into()).is_retryable());
        assert_eq!(ProviderError::Timeout(15).to_string(), "provider timed out after 15s");
    }

    #[test]
    fn extracts_error_messages() {
        assert_eq!(
            error_message(&json!({"error": {"message": "invalid token"}})).as_deref(),
            Some("invalid token")
        );
        assert_eq!(error_message(&json!({"error": "nope"})).as_deref(), Some("nope"));
        assert_eq!(error_message(&json!({"message": "bad from"})).as_deref(), Some("bad from"));
        assert_eq!(error_message(&json!({"ok": true})), None);
    }

    #[test]
    fn phone_messages_carry_text_only() {
        let entry = QueueEntry::new(
            NewMessage {
                tenant_id: "t1".to_string(),
                channel: crate::models::Channel::Sms,
                template_id: None,
                recipient: "+15551234567".to_string(),
                subject: String::new(),
                content: "hi".to_string(),
                text_content: None,
                variables: Default::default(),
                priority: Priority::Medium,
                scheduled_for: None,
                metadata: serde_json::Value::Null,
            },
            3,
        );

        let message = ProviderMessage::from_entry(&entry, &ChannelCredentials::default());
        assert_eq!(message.text.as_deref(), Some("hi"));
        assert!(message.html.is_none());
    }
}

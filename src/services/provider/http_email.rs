//! Transactional email over an HTTPS API (`POST {base}/emails`)

use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, id_of, read_json, Provider, ProviderError, ProviderMessage, ProviderReceipt};
use crate::config::EmailConfig;
use crate::models::EmailAddress;

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

/// Email provider speaking the Resend-style JSON API
pub struct HttpEmailProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    default_from: Option<EmailAddress>,
}

impl HttpEmailProvider {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: http_client(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_from: config.default_from.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.api_base)
    }
}

#[async_trait]
impl Provider for HttpEmailProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, message: &ProviderMessage) -> Result<ProviderReceipt, ProviderError> {
        let api_key = message
            .credentials
            .token
            .as_deref()
            .or(self.api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredentials("email API key".to_string()))?;

        let from = message
            .credentials
            .from
            .as_ref()
            .or(self.default_from.as_ref())
            .ok_or_else(|| ProviderError::MissingCredentials("email sender address".to_string()))?;

        let to = message.to.trim();
        if !to.contains('@') || to.starts_with('@') || to.ends_with('@') {
            return Err(ProviderError::InvalidRecipient(to.to_string()));
        }
        if message.html.is_none() && message.text.is_none() {
            return Err(ProviderError::InvalidMessage("email has no body".to_string()));
        }

        let payload = EmailPayload {
            from: from.formatted(),
            to: [to],
            subject: &message.subject,
            html: message.html.as_deref(),
            text: message.text.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let body = read_json(response).await?;
        Ok(ProviderReceipt {
            external_id: id_of(body.get("id")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, ChannelCredentials};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, api_key: Option<&str>) -> HttpEmailProvider {
        HttpEmailProvider::new(&EmailConfig {
            api_base: server.uri(),
            api_key: api_key.map(|k| k.to_string()),
            default_from: Some(EmailAddress::with_name("noreply@vibenet.shop", "Vibenet")),
            ..Default::default()
        })
    }

    fn message() -> ProviderMessage {
        ProviderMessage {
            channel: Channel::Email,
            to: "c@x.com".to_string(),
            subject: "Quote Q-1".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: Some("Hi".to_string()),
            credentials: ChannelCredentials::default(),
        }
    }

    #[tokio::test]
    async fn posts_email_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_default"))
            .and(body_partial_json(serde_json::json!({
                "from": "Vibenet <noreply@vibenet.shop>",
                "to": ["c@x.com"],
                "subject": "Quote Q-1",
                "text": "Hi"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "em_123"})))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = provider(&server, Some("re_default")).send(&message()).await.unwrap();
        assert_eq!(receipt.external_id.as_deref(), Some("em_123"));
    }

    #[tokio::test]
    async fn tenant_credentials_take_precedence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer re_tenant"))
            .and(body_partial_json(serde_json::json!({"from": "billing@acme.test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "em_9"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut msg = message();
        msg.credentials = ChannelCredentials {
            token: Some("re_tenant".to_string()),
            sender_id: None,
            from: Some(EmailAddress::new("billing@acme.test")),
        };

        let receipt = provider(&server, Some("re_default")).send(&msg).await.unwrap();
        assert_eq!(receipt.external_id.as_deref(), Some("em_9"));
    }

    #[tokio::test]
    async fn server_error_is_retryable_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"message": "internal error"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server, Some("key")).send(&message()).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Http {
                status: 500,
                message: "internal error".to_string()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unparseable_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let err = provider(&server, Some("key")).send(&message()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_api_key_never_calls_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(&server, None).send(&message()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(_)));
    }
}

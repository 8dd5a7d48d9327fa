//! SMTP email provider

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use super::{Provider, ProviderError, ProviderMessage, ProviderReceipt};
use crate::config::{SmtpConfig, SmtpEncryption};
use crate::models::EmailAddress;

/// Email provider relaying through an SMTP server
pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: Option<EmailAddress>,
}

impl SmtpEmailProvider {
    /// Build the transport. No connection is opened until the first send.
    pub fn new(config: &SmtpConfig, default_from: Option<EmailAddress>) -> Result<Self, ProviderError> {
        let builder = match config.encryption {
            SmtpEncryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            SmtpEncryption::StartTls => {
                let tls = TlsParameters::builder(config.host.clone())
                    .build()
                    .map_err(|e| ProviderError::Configuration(format!("SMTP TLS: {}", e)))?;

                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?
                    .tls(Tls::Required(tls))
            }
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            default_from,
        })
    }

    fn build_message(&self, message: &ProviderMessage) -> Result<Message, ProviderError> {
        let from = message
            .credentials
            .from
            .as_ref()
            .or(self.default_from.as_ref())
            .ok_or_else(|| ProviderError::MissingCredentials("email sender address".to_string()))?;

        let from: Mailbox = from
            .formatted()
            .parse()
            .map_err(|e: lettre::address::AddressError| ProviderError::Configuration(format!("sender: {}", e)))?;
        let to: Mailbox = message
            .to
            .trim()
            .parse()
            .map_err(|_: lettre::address::AddressError| ProviderError::InvalidRecipient(message.to.clone()))?;

        let builder = Message::builder().from(from).to(to).subject(&message.subject);

        let built = match (&message.html, &message.text) {
            (Some(html), Some(text)) => {
                builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
            }
            (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, None) => return Err(ProviderError::InvalidMessage("email has no body".to_string())),
        };

        built.map_err(|e| ProviderError::InvalidMessage(e.to_string()))
    }
}

#[async_trait]
impl Provider for SmtpEmailProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &ProviderMessage) -> Result<ProviderReceipt, ProviderError> {
        let email = self.build_message(message)?;

        let response = self.transport.send(email).await.map_err(|e| {
            if e.is_permanent() {
                ProviderError::Rejected(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let reply = response.message().collect::<Vec<_>>().join(" ");
        Ok(ProviderReceipt {
            external_id: Some(reply).filter(|r| !r.trim().is_empty()),
        })
    }
}

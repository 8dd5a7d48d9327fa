//! SMS and WhatsApp gateways
//!
//! Both speak the same JSON shape: `{to, type: "text", text: {body}}` with a
//! bearer token. WhatsApp adds `messaging_product`.

use async_trait::async_trait;
use serde_json::json;

use super::{http_client, id_of, read_json, Provider, ProviderError, ProviderMessage, ProviderReceipt};
use crate::config::GatewayConfig;
use crate::models::normalize_phone;

/// Which gateway dialect to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Sms,
    Whatsapp,
}

pub struct GatewayProvider {
    kind: GatewayKind,
    client: reqwest::Client,
    endpoint: Option<String>,
    token: Option<String>,
    sender: Option<String>,
}

impl GatewayProvider {
    pub fn new(kind: GatewayKind, config: &GatewayConfig) -> Self {
        Self {
            kind,
            client: http_client(),
            endpoint: config.endpoint.clone().filter(|e| !e.trim().is_empty()),
            token: config.token.clone(),
            sender: config.sender.clone(),
        }
    }

    pub fn sms(config: &GatewayConfig) -> Self {
        Self::new(GatewayKind::Sms, config)
    }

    pub fn whatsapp(config: &GatewayConfig) -> Self {
        Self::new(GatewayKind::Whatsapp, config)
    }

    fn label(&self) -> &'static str {
        match self.kind {
            GatewayKind::Sms => "SMS",
            GatewayKind::Whatsapp => "WhatsApp",
        }
    }

    fn payload(&self, to: &str, body: &str, sender: Option<&str>) -> serde_json::Value {
        let mut payload = json!({
            "to": to,
            "type": "text",
            "text": { "body": body },
        });
        match self.kind {
            GatewayKind::Whatsapp => payload["messaging_product"] = json!("whatsapp"),
            GatewayKind::Sms => {
                if let Some(sender) = sender {
                    payload["from"] = json!(sender);
                }
            }
        }
        payload
    }
}

#[async_trait]
impl Provider for GatewayProvider {
    fn name(&self) -> &'static str {
        match self.kind {
            GatewayKind::Sms => "sms-gateway",
            GatewayKind::Whatsapp => "whatsapp-cloud",
        }
    }

    async fn send(&self, message: &ProviderMessage) -> Result<ProviderReceipt, ProviderError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials(format!("{} endpoint", self.label())))?;

        let token = message
            .credentials
            .token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredentials(format!("{} token", self.label())))?;

        let sender = message
            .credentials
            .sender_id
            .as_deref()
            .or(self.sender.as_deref())
            .filter(|s| !s.trim().is_empty());

        let url = if endpoint.contains("{sender}") {
            let sender = sender
                .ok_or_else(|| ProviderError::MissingCredentials(format!("{} sender id", self.label())))?;
            endpoint.replace("{sender}", sender)
        } else {
            endpoint.to_string()
        };

        let to = normalize_phone(&message.to);
        if to.trim_start_matches('+').len() < 7 {
            return Err(ProviderError::InvalidRecipient(message.to.clone()));
        }

        let body = message
            .text
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ProviderError::InvalidMessage(format!("{} message has no text", self.label())))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&self.payload(&to, body, sender))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let json = read_json(response).await?;
        let external_id = id_of(json.pointer("/messages/0/id")).or_else(|| id_of(json.get("id")));

        Ok(ProviderReceipt { external_id })
    }
}

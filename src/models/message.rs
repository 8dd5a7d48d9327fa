//! Message Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::QueueStatus;

/// Template variables, keyed by placeholder name
pub type Variables = HashMap<String, String>;

/// Communication channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Whatsapp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
        }
    }

    /// Value used when tenant settings are missing or unreadable.
    /// Paid channels stay off unless a tenant opted in.
    pub fn default_enabled(&self) -> bool {
        matches!(self, Self::Email)
    }

    /// Whether recipients are phone numbers
    pub fn is_phone(&self) -> bool {
        matches!(self, Self::Sms | Self::Whatsapp)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(format!("Unknown channel: {}", other)),
        }
    }
}

/// Message priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Ordering weight, higher is dispatched first
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

/// Email address with optional name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Email address
    pub email: String,
    /// Display name (optional)
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }

    pub fn with_name(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: Some(name.to_string()),
        }
    }

    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

impl From<&str> for EmailAddress {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

/// Strip everything but digits and a leading `+`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    normalized
}

/// Subject and bodies of a message, before or after variable substitution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

impl MessageContent {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            html_body: None,
            text_body: None,
        }
    }

    /// Plain text message (SMS, WhatsApp)
    pub fn plain(body: &str) -> Self {
        Self {
            subject: String::new(),
            html_body: None,
            text_body: Some(body.to_string()),
        }
    }

    pub fn html(mut self, body: &str) -> Self {
        self.html_body = Some(body.to_string());
        self
    }

    pub fn text(mut self, body: &str) -> Self {
        self.text_body = Some(body.to_string());
        self
    }

    pub fn has_body(&self) -> bool {
        self.html_body.is_some() || self.text_body.is_some()
    }
}

/// Reference to a stored template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Id(Uuid),
    Slug(String),
}

impl From<&str> for TemplateRef {
    fn from(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Slug(value.to_string()),
        }
    }
}

impl std::fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

/// A request to send one message through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub tenant_id: String,
    pub channel: Channel,
    pub recipient: String,
    /// Stored template to render; takes precedence over `content`
    pub template: Option<TemplateRef>,
    /// Inline content, used when no template is given or it cannot be found
    pub content: Option<MessageContent>,
    pub variables: Variables,
    pub priority: Priority,
    /// Defaults to now
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl SendRequest {
    pub fn builder() -> SendRequestBuilder {
        SendRequestBuilder::default()
    }
}

/// Fluent builder for [`SendRequest`]
#[derive(Debug, Default)]
pub struct SendRequestBuilder {
    tenant_id: Option<String>,
    channel: Option<Channel>,
    recipient: Option<String>,
    template: Option<TemplateRef>,
    subject: Option<String>,
    html_body: Option<String>,
    text_body: Option<String>,
    variables: Variables,
    priority: Priority,
    scheduled_for: Option<DateTime<Utc>>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl SendRequestBuilder {
    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn to(mut self, recipient: &str) -> Self {
        self.recipient = Some(recipient.to_string());
        self
    }

    pub fn template(mut self, template: impl Into<TemplateRef>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn html(mut self, body: &str) -> Self {
        self.html_body = Some(body.to_string());
        self
    }

    pub fn text(mut self, body: &str) -> Self {
        self.text_body = Some(body.to_string());
        self
    }

    pub fn variable(mut self, key: &str, value: impl Into<String>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn schedule(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Result<SendRequest, String> {
        let tenant_id = self
            .tenant_id
            .filter(|t| !t.trim().is_empty())
            .ok_or("Tenant is required")?;
        let channel = self.channel.ok_or("Channel is required")?;
        let recipient = self
            .recipient
            .filter(|r| !r.trim().is_empty())
            .ok_or("Recipient is required")?;

        let content = if self.subject.is_some() || self.html_body.is_some() || self.text_body.is_some() {
            Some(MessageContent {
                subject: self.subject.unwrap_or_default(),
                html_body: self.html_body,
                text_body: self.text_body,
            })
        } else {
            None
        };

        match (&self.template, &content) {
            (None, None) => return Err("A template or message body is required".to_string()),
            (None, Some(c)) if !c.has_body() => {
                return Err("Message must have a body (text or HTML)".to_string())
            }
            _ => {}
        }

        Ok(SendRequest {
            tenant_id,
            channel,
            recipient,
            template: self.template,
            content,
            variables: self.variables,
            priority: self.priority,
            scheduled_for: self.scheduled_for,
            metadata: serde_json::Value::Object(self.metadata),
        })
    }
}

/// Structured result of a send attempt, as reported to the producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub queue_id: Option<Uuid>,
    pub status: Option<QueueStatus>,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn disabled(channel: Channel) -> Self {
        Self::failure(format!("{} communication is disabled in business settings", channel))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            queue_id: None,
            status: None,
            external_id: None,
            error: Some(error.into()),
        }
    }

    /// Accepted into the queue, dispatch deferred
    pub fn queued(queue_id: Uuid) -> Self {
        Self {
            success: true,
            queue_id: Some(queue_id),
            status: Some(QueueStatus::Pending),
            external_id: None,
            error: None,
        }
    }
}

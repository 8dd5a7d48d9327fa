//! Send Handler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Channel, Priority, QueueStatus, SendOutcome, SendRequest, Variables};
use crate::services::CommunicationService;

#[derive(Debug, Clone, Deserialize)]
pub struct SendRequestBody {
    pub tenant_id: String,
    pub channel: String,
    pub to: String,
    /// Template id or slug
    pub template: Option<String>,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    #[serde(default)]
    pub variables: Variables,
    pub priority: Option<String>,
    /// RFC 3339; omitted means now
    pub scheduled_for: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: String,
    pub queue_id: Option<String>,
    pub status: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkSendResponse {
    pub total: usize,
    pub sent: usize,
    pub queued: usize,
    pub failed: usize,
    pub errors: Vec<BulkError>,
}

#[derive(Debug, Serialize)]
pub struct BulkError {
    pub index: usize,
    pub recipient: String,
    pub error: String,
}

/// Send handler
pub struct SendHandler {
    comms: Arc<CommunicationService>,
}

impl SendHandler {
    pub fn new(comms: Arc<CommunicationService>) -> Self {
        Self { comms }
    }

    /// Send one message. Request validation errors are returned as `Err`,
    /// pipeline failures as an unsuccessful response.
    pub async fn send(&self, body: SendRequestBody) -> Result<SendResponse, String> {
        let request = Self::to_request(body)?;
        let outcome = self.comms.send(request).await;
        Ok(Self::to_response(outcome))
    }

    /// Send many messages, reporting per-item failures
    pub async fn send_bulk(&self, bodies: Vec<SendRequestBody>) -> BulkSendResponse {
        let total = bodies.len();
        let mut errors = Vec::new();
        let mut requests = Vec::with_capacity(total);
        let mut positions = Vec::with_capacity(total);

        for (index, body) in bodies.into_iter().enumerate() {
            let recipient = body.to.clone();
            match Self::to_request(body) {
                Ok(request) => {
                    requests.push(request);
                    positions.push((index, recipient));
                }
                Err(error) => errors.push(BulkError { index, recipient, error }),
            }
        }

        let mut sent = 0;
        let mut queued = 0;
        let outcomes = self.comms.send_bulk(requests).await;

        for ((index, recipient), outcome) in positions.into_iter().zip(outcomes) {
            match outcome {
                SendOutcome { success: true, status: Some(QueueStatus::Sent), .. } => sent += 1,
                SendOutcome { success: true, .. } => queued += 1,
                SendOutcome { error, .. } => errors.push(BulkError {
                    index,
                    recipient,
                    error: error.unwrap_or_else(|| "unknown error".to_string()),
                }),
            }
        }
        errors.sort_by_key(|e| e.index);

        BulkSendResponse {
            total,
            sent,
            queued,
            failed: errors.len(),
            errors,
        }
    }

    fn to_request(body: SendRequestBody) -> Result<SendRequest, String> {
        let mut builder = SendRequest::builder()
            .tenant(&body.tenant_id)
            .channel(body.channel.parse::<Channel>()?)
            .to(&body.to)
            .variables(body.variables);

        if let Some(template) = body.template {
            builder = builder.template(template.as_str());
        }
        if let Some(subject) = body.subject {
            builder = builder.subject(&subject);
        }
        if let Some(text) = body.text_body {
            builder = builder.text(&text);
        }
        if let Some(html) = body.html_body {
            builder = builder.html(&html);
        }
        if let Some(priority) = body.priority {
            builder = builder.priority(priority.parse::<Priority>()?);
        }
        if let Some(at) = body.scheduled_for {
            let at = DateTime::parse_from_rfc3339(&at)
                .map_err(|e| format!("Invalid scheduled_for: {}", e))?
                .with_timezone(&Utc);
            builder = builder.schedule(at);
        }
        for (key, value) in body.metadata.unwrap_or_default() {
            builder = builder.meta(&key, value);
        }

        builder.build()
    }

    fn to_response(outcome: SendOutcome) -> SendResponse {
        let message = match (&outcome.error, outcome.status) {
            (Some(error), _) => error.clone(),
            (None, Some(QueueStatus::Sent)) => "Message sent".to_string(),
            (None, _) => "Message queued for delivery".to_string(),
        };

        SendResponse {
            success: outcome.success,
            message,
            queue_id: outcome.queue_id.map(|id| id.to_string()),
            status: outcome.status.map(|s| s.to_string()),
            external_id: outcome.external_id,
        }
    }
}

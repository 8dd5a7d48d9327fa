//! Communication Service - Main dispatch pipeline
//!
//! `send`: settings gate → template resolution → enqueue → (if due) claim →
//! dispatch → delivery log.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    Channel, MessageContent, NewMessage, Priority, QueueEntry, QueueStatus, SendOutcome, SendRequest,
    TemplateRef, Variables,
};
use crate::services::dispatcher::{DispatchResult, Dispatcher};
use crate::services::log::{DeliveryLogger, LogError};
use crate::services::provider::ProviderError;
use crate::services::queue::{QueueError, QueueService};
use crate::services::settings::{SettingsError, SettingsGate};
use crate::services::template::{
    check_required_variables, html_to_text, ResolvedContent, TemplateError, TemplateResolver, TemplateService,
};

/// Pipeline error
#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Log error: {0}")]
    Log(#[from] LogError),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Invalid message: {0}")]
    Invalid(String),
}

impl CommsError {
    /// Storage failures, which break auditability
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Queue(QueueError::Store(_)) | Self::Log(_))
    }
}

/// Result of queue processing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub sent: usize,
    pub failed: usize,
    pub retried: usize,
    /// Entries another worker claimed first
    pub skipped: usize,
    pub errors: Vec<(Uuid, String)>,
}

/// Main communication service
pub struct CommunicationService {
    gate: Arc<SettingsGate>,
    templates: Arc<TemplateService>,
    resolver: Arc<TemplateResolver>,
    queue: Arc<QueueService>,
    dispatcher: Arc<Dispatcher>,
    logger: Arc<DeliveryLogger>,
    /// Parallel dispatches in `process_due` and `send_bulk`
    concurrency: usize,
}

impl CommunicationService {
    pub fn new(
        gate: Arc<SettingsGate>,
        templates: Arc<TemplateService>,
        resolver: Arc<TemplateResolver>,
        queue: Arc<QueueService>,
        dispatcher: Arc<Dispatcher>,
        logger: Arc<DeliveryLogger>,
    ) -> Self {
        Self {
            gate,
            templates,
            resolver,
            queue,
            dispatcher,
            logger,
            concurrency: 4,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Get settings gate
    pub fn gate(&self) -> &Arc<SettingsGate> {
        &self.gate
    }

    /// Get template service
    pub fn templates(&self) -> &Arc<TemplateService> {
        &self.templates
    }

    pub fn resolver(&self) -> &Arc<TemplateResolver> {
        &self.resolver
    }

    /// Get queue service
    pub fn queue(&self) -> &Arc<QueueService> {
        &self.queue
    }

    /// Get delivery logger
    pub fn logs(&self) -> &Arc<DeliveryLogger> {
        &self.logger
    }

    /// Send one message through the full pipeline.
    ///
    /// Disabled channels are refused before anything is queued. Requests
    /// scheduled in the future are only queued.
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        let tenant_id = request.tenant_id.clone();
        let recipient = request.recipient.clone();
        let channel = request.channel;

        self.gate
            .send_with_settings_check(&tenant_id, channel, &recipient, || self.send_unchecked(request))
            .await
    }

    /// Send many requests, outcomes in request order
    pub async fn send_bulk(&self, requests: Vec<SendRequest>) -> Vec<SendOutcome> {
        stream::iter(requests)
            .map(|request| self.send(request))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Templated email, as used by reminders
    pub async fn send_enhanced_email(
        &self,
        tenant_id: &str,
        to: &str,
        template: impl Into<TemplateRef>,
        variables: Variables,
        priority: Priority,
        metadata: serde_json::Value,
    ) -> SendOutcome {
        let request = SendRequest {
            tenant_id: tenant_id.to_string(),
            channel: Channel::Email,
            recipient: to.to_string(),
            template: Some(template.into()),
            content: None,
            variables,
            priority,
            scheduled_for: None,
            metadata,
        };
        self.send(request).await
    }

    async fn send_unchecked(&self, request: SendRequest) -> Result<SendOutcome, CommsError> {
        let (content, template_id, defaults) = self.source_content(&request).await?;

        let resolved = self
            .resolver
            .resolve_layered(content, &defaults, &request.variables, &request.tenant_id)
            .await;

        let report = check_required_variables(&resolved.content);
        if !report.is_complete() || !report.unresolved.is_empty() {
            debug!(
                tenant_id = %request.tenant_id,
                missing = ?report.missing,
                unresolved = ?report.unresolved,
                "message has unresolved placeholders"
            );
        }

        let message = build_message(&request, resolved, template_id)?;
        let entry = self.queue.enqueue(message).await?;

        if entry.scheduled_for > Utc::now() {
            return Ok(SendOutcome::queued(entry.id));
        }
        self.deliver(entry.id).await
    }

    /// Template content, template id and template defaults for a request
    async fn source_content(
        &self,
        request: &SendRequest,
    ) -> Result<(MessageContent, Option<Uuid>, Variables), CommsError> {
        let Some(reference) = &request.template else {
            return request
                .content
                .clone()
                .map(|c| (c, None, Variables::new()))
                .ok_or_else(|| CommsError::Invalid("A template or message body is required".to_string()));
        };

        match self.templates.find(reference).await {
            Ok(template) => {
                if template.channel.is_some_and(|c| c != request.channel) {
                    warn!(template = %reference, channel = %request.channel, "template written for another channel");
                }
                let missing = template.missing_variables(|name| request.variables.contains_key(name));
                if !missing.is_empty() {
                    debug!(template = %reference, ?missing, "required template variables not supplied");
                }
                let defaults = template
                    .defaults()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                Ok((template.content(), Some(template.id), defaults))
            }
            Err(e) => match &request.content {
                Some(content) => {
                    warn!(template = %reference, error = %e, "template unavailable, using inline content");
                    Ok((content.clone(), None, Variables::new()))
                }
                None => Err(e.into()),
            },
        }
    }

    /// Claim, dispatch and record one queued entry.
    ///
    /// An entry left in `sending` by a worker that never recorded an outcome
    /// is claimed again once the queue's claim lease runs out, so a message
    /// can reach the provider twice.
    pub async fn deliver(&self, id: Uuid) -> Result<SendOutcome, CommsError> {
        let Some(entry) = self.queue.claim(id).await? else {
            let current = self.queue.get(id).await?;
            debug!(queue_id = %id, status = %current.status, "entry not claimable");
            return Ok(outcome_of(&current));
        };

        let result = self.dispatch_claimed(&entry).await;
        let status = self.logger.record_outcome(&entry, &result).await?;

        Ok(SendOutcome {
            success: result.success,
            queue_id: Some(entry.id),
            status: Some(status),
            external_id: result.external_id,
            error: result.error,
        })
    }

    async fn dispatch_claimed(&self, entry: &QueueEntry) -> DispatchResult {
        let settings = self.gate.settings_or_default(&entry.tenant_id).await;
        if !settings.is_enabled(entry.channel) {
            debug!(queue_id = %entry.id, channel = %entry.channel, "channel disabled since enqueue");
            let refused = SendOutcome::disabled(entry.channel);
            return DispatchResult::refused(refused.error.unwrap_or_default());
        }

        self.dispatcher
            .dispatch(entry, &settings.credentials(entry.channel))
            .await
    }

    /// Dispatch due `pending` and `retry_scheduled` entries, plus `sending`
    /// entries whose claim lease has expired
    pub async fn process_due(&self, limit: usize) -> Result<ProcessResult, CommsError> {
        let due = self.queue.due(limit).await?;
        if due.is_empty() {
            return Ok(ProcessResult::default());
        }

        let outcomes: Vec<_> = stream::iter(due.into_iter().map(|e| e.id))
            .map(|id| async move { (id, self.deliver(id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut result = ProcessResult::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(outcome) => match outcome.status {
                    Some(QueueStatus::Sent) => result.sent += 1,
                    Some(QueueStatus::Failed) => result.failed += 1,
                    Some(QueueStatus::RetryScheduled) => result.retried += 1,
                    _ => result.skipped += 1,
                },
                Err(e) => {
                    warn!(queue_id = %id, error = %e, "dispatch failed");
                    result.errors.push((id, e.to_string()));
                }
            }
        }

        info!(
            sent = result.sent,
            failed = result.failed,
            retried = result.retried,
            errors = result.errors.len(),
            "processed due messages"
        );
        Ok(result)
    }
}

/// Queue row for resolved content
fn build_message(
    request: &SendRequest,
    resolved: ResolvedContent,
    template_id: Option<Uuid>,
) -> Result<NewMessage, CommsError> {
    let MessageContent {
        subject,
        html_body,
        text_body,
    } = resolved.content;

    let (content, text_content) = if request.channel.is_phone() {
        let text = text_body
            .or_else(|| html_body.as_deref().map(html_to_text))
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CommsError::Invalid(format!("{} message has no text", request.channel)))?;
        (text, None)
    } else {
        let text = text_body.or_else(|| html_body.as_deref().map(html_to_text));
        let content = html_body
            .or_else(|| text.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CommsError::Invalid("Email has no body".to_string()))?;
        (content, text)
    };

    Ok(NewMessage {
        tenant_id: request.tenant_id.clone(),
        channel: request.channel,
        template_id,
        recipient: request.recipient.trim().to_string(),
        subject,
        content,
        text_content,
        variables: resolved.variables,
        priority: request.priority,
        scheduled_for: request.scheduled_for,
        metadata: request.metadata.clone(),
    })
}

fn outcome_of(entry: &QueueEntry) -> SendOutcome {
    SendOutcome {
        success: matches!(
            entry.status,
            QueueStatus::Sent | QueueStatus::Pending | QueueStatus::Sending
        ),
        queue_id: Some(entry.id),
        status: Some(entry.status),
        external_id: entry.external_id.clone(),
        error: entry.last_error.clone(),
    }
}

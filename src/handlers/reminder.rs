//! Reminder Trigger Handler
//!
//! Entry point for cron or manual invocation of a reminder run. The surface is
//! framework-neutral: callers pass the HTTP method and raw body and write the
//! returned status, headers and JSON body to their own response type.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::services::{ReminderRunOptions, ReminderRunSummary, ReminderService};

pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "authorization, x-client-info, apikey, content-type"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    pub success: bool,
    #[serde(flatten)]
    pub summary: Option<ReminderRunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct TriggerResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    /// JSON, empty for preflight
    pub body: String,
}

impl TriggerResponse {
    fn preflight() -> Self {
        Self {
            status: 200,
            headers: CORS_HEADERS.to_vec(),
            body: String::new(),
        }
    }

    fn json(status: u16, body: &TriggerBody) -> Self {
        let mut headers = CORS_HEADERS.to_vec();
        headers.push(("Content-Type", "application/json"));

        let body = serde_json::to_string(body)
            .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{}"}}"#, e));
        Self { status, headers, body }
    }
}

/// Reminder trigger handler
pub struct ReminderTriggerHandler {
    reminders: Arc<ReminderService>,
}

impl ReminderTriggerHandler {
    pub fn new(reminders: Arc<ReminderService>) -> Self {
        Self { reminders }
    }

    /// Handle one invocation. Body is optional JSON `{dryRun?, tenantId?}`.
    pub async fn handle(&self, method: &str, body: &str) -> TriggerResponse {
        if method.eq_ignore_ascii_case("OPTIONS") {
            return TriggerResponse::preflight();
        }
        if !method.eq_ignore_ascii_case("POST") && !method.eq_ignore_ascii_case("GET") {
            return TriggerResponse::json(405, &failure(format!("Method {} not allowed", method)));
        }

        let options = match parse_options(body) {
            Ok(options) => options,
            Err(e) => return TriggerResponse::json(400, &failure(format!("Invalid request body: {}", e))),
        };

        info!(dry_run = options.dry_run, tenant_id = ?options.tenant_id, "reminder run triggered");

        match self.reminders.run(options).await {
            Ok(summary) => TriggerResponse::json(
                200,
                &TriggerBody {
                    success: true,
                    summary: Some(summary),
                    error: None,
                },
            ),
            Err(e) => {
                error!(error = %e, "reminder run failed");
                TriggerResponse::json(500, &failure(e.to_string()))
            }
        }
    }
}

fn parse_options(body: &str) -> Result<ReminderRunOptions, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(ReminderRunOptions::default());
    }
    serde_json::from_str(body)
}

fn failure(error: String) -> TriggerBody {
    TriggerBody {
        success: false,
        summary: None,
        error: Some(error),
    }
}

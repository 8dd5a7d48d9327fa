//! CommDispatch - Multi-channel Communication Dispatch
//!
//! Decides whether a tenant notification (email, SMS, WhatsApp) may be sent,
//! renders it, persists it in an outbound queue, hands it to a provider and
//! records every attempt for audit:
//!
//! - **Settings Gate**: per-tenant channel switches, checked before anything is queued
//! - **Template Resolver**: `{{placeholder}}` substitution with derived tenant URLs
//! - **Outbound Queue**: `pending → sending → sent | failed | retry_scheduled`
//! - **Provider Dispatcher**: one time-bounded attempt per claim (HTTP email, SMTP, SMS, WhatsApp)
//! - **Delivery Logger**: one audit row per attempt, idempotent per `(queue_id, attempt)`
//! - **Reminder Trigger**: quote-expiry and invoice-due reminders with a dedup ledger
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use commdispatch::{CommsConfig, CommsPlugin, MemoryStore, SendRequest, Channel, Stores};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     commdispatch::telemetry::init_tracing("commdispatch=info");
//!
//!     let config = CommsConfig::load("comms.yaml")?.apply_env();
//!     let plugin = CommsPlugin::from_config(config, Stores::memory(Arc::new(MemoryStore::new())))?;
//!     plugin.initialize().await.ok();
//!
//!     let request = SendRequest::builder()
//!         .tenant("abc123")
//!         .channel(Channel::Email)
//!         .to("amy@example.com")
//!         .subject("Welcome {{user_name}}")
//!         .html("<p>Sign in at {{login_url}}</p>")
//!         .variable("user_name", "Amy")
//!         .build()
//!         .map_err(anyhow::Error::msg)?;
//!
//!     let outcome = plugin.send(request).await;
//!     println!("sent: {}", outcome.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Reminders
//!
//! ```rust,ignore
//! use commdispatch::ReminderRunOptions;
//!
//! async fn nightly(plugin: &commdispatch::CommsPlugin) {
//!     let summary = plugin.run_reminders(ReminderRunOptions::default()).await.unwrap();
//!     println!("quotes: {}, invoices: {}", summary.quotes_notified, summary.invoices_notified);
//! }
//! ```

pub mod config;
pub mod handlers;
pub mod hooks;
pub mod models;
pub mod plugin;
pub mod services;
pub mod telemetry;

// Re-exports
pub use config::CommsConfig;

pub use models::{
    Channel, CommunicationLog, CommunicationSettings, DeliveryStatus, EmailAddress, MessageContent,
    MessageTemplate, Priority, QueueEntry, QueueStatus, RetryPolicy, SendOutcome, SendRequest,
    TemplateBuilder, TenantDomain,
};

pub use services::{
    CommsError, CommunicationService, DeliveryLogger, Dispatcher, MemoryStore, ProcessResult, Provider,
    ProviderError, QueueService, ReminderRunOptions, ReminderRunSummary, ReminderService, SettingsGate,
    TemplateResolver, TemplateService,
};

pub use handlers::{LogHandler, QueueHandler, ReminderTriggerHandler, SendHandler, TemplateHandler};

pub use plugin::{plugin_info, CommsPlugin, PluginInfo, Stores};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// In-memory plugin built from `config`
pub fn init(config: CommsConfig) -> Result<(CommsPlugin, std::sync::Arc<MemoryStore>), ProviderError> {
    let store = std::sync::Arc::new(MemoryStore::new());
    let plugin = CommsPlugin::from_config(config, Stores::memory(store.clone()))?;
    Ok((plugin, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_creation() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();
        assert_eq!(plugin.name(), "CommDispatch");
        assert_eq!(plugin.version(), VERSION);
    }

    #[tokio::test]
    async fn test_initialize_registers_reminder_templates() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();
        plugin.initialize().await.unwrap();

        let templates = plugin.template_handler().list(Some("email")).await.unwrap();
        let slugs: Vec<_> = templates.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["invoice-due-reminder", "quote-expiry-reminder"]);
    }

    #[tokio::test]
    async fn test_system_templates_available_before_initialize() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();

        let templates = plugin.template_handler().list(Some("email")).await.unwrap();
        let slugs: Vec<_> = templates.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["invoice-due-reminder", "quote-expiry-reminder"]);
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_are_emitted() {
        use tracing_subscriber::layer::SubscriberExt;

        let recorder = hooks::recorder::HookRecorder::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

        let (plugin, _store) = init(CommsConfig::default()).unwrap();
        let request = SendRequest::builder()
            .tenant("t1")
            .channel(Channel::Email)
            .to("c@x.com")
            .subject("Hello")
            .text("Hello")
            .build()
            .unwrap();
        let outcome = plugin.send(request).await;
        assert_eq!(outcome.status, Some(QueueStatus::Failed));

        plugin
            .run_reminders(ReminderRunOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            recorder.fired(),
            vec![hooks::QUEUED, hooks::FAILED, hooks::REMINDERS_RUN]
        );
    }

    #[tokio::test]
    async fn test_template_preview_reports_urls() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();
        plugin.initialize().await.unwrap();

        let preview = plugin
            .template_handler()
            .preview(
                "quote-expiry-reminder",
                serde_json::from_value(serde_json::json!({
                    "tenant_id": "abc123",
                    "variables": { "quote_number": "Q-9", "valid_until": "2026-03-11" }
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(preview.subject, "Reminder: Quote Q-9 expires soon");
        assert!(preview
            .html_body
            .unwrap()
            .contains("https://tenant-abc123.vibenet.shop/dashboard"));
        assert!(preview.report.missing.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_preflight_and_method_check() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();

        let preflight = plugin.reminder_handler().handle("OPTIONS", "").await;
        assert_eq!(preflight.status, 200);
        assert!(preflight
            .headers
            .contains(&("Access-Control-Allow-Origin", "*")));
        assert!(preflight.body.is_empty());

        let rejected = plugin.reminder_handler().handle("DELETE", "").await;
        assert_eq!(rejected.status, 405);

        let bad = plugin.reminder_handler().handle("POST", "{oops").await;
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn test_trigger_dry_run_on_empty_store() {
        let (plugin, _store) = init(CommsConfig::default()).unwrap();

        let response = plugin
            .reminder_handler()
            .handle("POST", r#"{"dryRun": true, "tenantId": "t1"}"#)
            .await;
        assert_eq!(response.status, 200);

        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["dryRun"], true);
        assert_eq!(body["quotesNotified"], 0);
    }

    #[test]
    fn test_plugin_info() {
        let info = plugin_info();
        assert_eq!(info.name, "CommDispatch");
        assert!(info.routes.contains(&"/functions/send-reminders"));
        assert_eq!(info.hooks, hooks::ALL.to_vec());
    }
}

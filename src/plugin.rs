//! Plugin Entry Point
//!
//! Wires stores, providers, services and handlers from a [`CommsConfig`].

use std::sync::Arc;
use tracing::info;

use crate::config::CommsConfig;
use crate::hooks;
use crate::handlers::{LogHandler, QueueHandler, ReminderTriggerHandler, SendHandler, TemplateHandler};
use crate::models::{RetryPolicy, SendOutcome, SendRequest};
use crate::services::{
    BusinessStore, CommunicationService, DeliveryLogger, Dispatcher, LogStore, MemoryStore, ProcessResult,
    ProviderError, QueueService, QueueStore, ReminderLedger, ReminderRunOptions, ReminderRunSummary,
    ReminderService, SettingsGate, SettingsStore, TemplateResolver, TemplateService,
};

/// Storage collaborators
#[derive(Clone)]
pub struct Stores {
    pub settings: Arc<dyn SettingsStore>,
    pub queue: Arc<dyn QueueStore>,
    pub logs: Arc<dyn LogStore>,
    pub business: Arc<dyn BusinessStore>,
    pub ledger: Arc<dyn ReminderLedger>,
}

impl Stores {
    /// Every store backed by one in-memory instance
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            settings: store.clone(),
            queue: store.clone(),
            logs: store.clone(),
            business: store.clone(),
            ledger: store,
        }
    }
}

/// Communication plugin
pub struct CommsPlugin {
    comms: Arc<CommunicationService>,
    reminders: Arc<ReminderService>,
    send_handler: SendHandler,
    template_handler: TemplateHandler,
    queue_handler: QueueHandler,
    log_handler: LogHandler,
    reminder_handler: ReminderTriggerHandler,
}

impl CommsPlugin {
    /// Build the plugin with providers from `config`
    pub fn from_config(config: CommsConfig, stores: Stores) -> Result<Self, ProviderError> {
        let dispatcher = Dispatcher::from_config(&config)?;
        Ok(Self::with_dispatcher(config, stores, dispatcher))
    }

    /// Build the plugin around an existing dispatcher
    pub fn with_dispatcher(config: CommsConfig, stores: Stores, dispatcher: Dispatcher) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.retry.max_attempts.max(1),
            ..config.retry.clone()
        };

        let templates = Arc::new(TemplateService::with_system_templates());
        let resolver = Arc::new(TemplateResolver::new(stores.settings.clone(), config.platform.clone()));
        // A live worker must not lose its claim while still inside the provider call
        let lease_secs = config
            .dispatch
            .claim_lease_secs
            .max(config.dispatch.timeout_secs.saturating_mul(2))
            .min(86_400);
        let queue = Arc::new(
            QueueService::new(stores.queue)
                .with_retry_policy(retry)
                .with_claim_lease(chrono::Duration::seconds(lease_secs as i64)),
        );
        let logger = Arc::new(DeliveryLogger::new(queue.clone(), stores.logs));

        let comms = Arc::new(
            CommunicationService::new(
                Arc::new(SettingsGate::new(stores.settings)),
                templates.clone(),
                resolver.clone(),
                queue,
                Arc::new(dispatcher),
                logger.clone(),
            )
            .with_concurrency(config.dispatch.concurrency),
        );

        let reminders = Arc::new(ReminderService::new(
            comms.clone(),
            stores.business,
            stores.ledger,
            config.reminders.clone(),
        ));

        Self {
            send_handler: SendHandler::new(comms.clone()),
            template_handler: TemplateHandler::new(templates, resolver),
            queue_handler: QueueHandler::new(comms.clone()),
            log_handler: LogHandler::new(logger),
            reminder_handler: ReminderTriggerHandler::new(reminders.clone()),
            comms,
            reminders,
        }
    }

    /// Initialize the plugin. System templates are already loaded at
    /// construction; this restores any that were deleted since.
    pub async fn initialize(&self) -> Result<(), String> {
        self.comms.templates().register_system_templates().await;
        info!(name = self.name(), version = self.version(), "plugin initialized");
        Ok(())
    }

    /// Get plugin name
    pub fn name(&self) -> &'static str {
        "CommDispatch"
    }

    /// Get plugin version
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn description(&self) -> &'static str {
        "Multi-channel communication dispatch"
    }

    // Service accessors
    pub fn comms(&self) -> &Arc<CommunicationService> {
        &self.comms
    }

    pub fn reminders(&self) -> &Arc<ReminderService> {
        &self.reminders
    }

    // Handler accessors
    pub fn send_handler(&self) -> &SendHandler {
        &self.send_handler
    }

    pub fn template_handler(&self) -> &TemplateHandler {
        &self.template_handler
    }

    pub fn queue_handler(&self) -> &QueueHandler {
        &self.queue_handler
    }

    pub fn log_handler(&self) -> &LogHandler {
        &self.log_handler
    }

    pub fn reminder_handler(&self) -> &ReminderTriggerHandler {
        &self.reminder_handler
    }

    // Convenience methods

    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        self.comms.send(request).await
    }

    /// Dispatch due queue entries
    pub async fn process_queue(&self, batch_size: usize) -> Result<ProcessResult, String> {
        self.comms.process_due(batch_size).await.map_err(|e| e.to_string())
    }

    pub async fn run_reminders(&self, options: ReminderRunOptions) -> Result<ReminderRunSummary, String> {
        self.reminders.run(options).await.map_err(|e| e.to_string())
    }
}

/// Plugin metadata for registration
pub fn plugin_info() -> PluginInfo {
    PluginInfo {
        name: "CommDispatch",
        version: env!("CARGO_PKG_VERSION"),
        description: "Multi-channel communication dispatch",
        dependencies: vec![],
        hooks: hooks::ALL.to_vec(),
        routes: vec![
            "/api/communications/send",
            "/api/communications/templates",
            "/api/communications/queue",
            "/api/communications/queue/process",
            "/api/communications/logs",
            "/functions/send-reminders",
        ],
    }
}

/// Plugin information
#[derive(Debug)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub dependencies: Vec<&'static str>,
    pub hooks: Vec<&'static str>,
    pub routes: Vec<&'static str>,
}

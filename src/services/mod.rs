//! Communication Services

pub mod communicator;
pub mod dispatcher;
pub mod log;
pub mod memory;
pub mod provider;
pub mod queue;
pub mod reminder;
pub mod settings;
pub mod store;
pub mod template;

pub use communicator::{CommsError, CommunicationService, ProcessResult};
pub use dispatcher::{DispatchResult, Dispatcher};
pub use log::DeliveryLogger;
pub use memory::MemoryStore;
pub use provider::{Provider, ProviderError};
pub use queue::QueueService;
pub use reminder::{ReminderRunOptions, ReminderRunSummary, ReminderService};
pub use settings::SettingsGate;
pub use store::{BusinessStore, LogStore, QueueStore, ReminderLedger, SettingsStore, StoreError};
pub use template::{TemplateResolver, TemplateService};

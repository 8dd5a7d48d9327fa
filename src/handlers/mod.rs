//! Communication Handlers

pub mod log;
pub mod queue;
pub mod reminder;
pub mod send;
pub mod template;

pub use log::LogHandler;
pub use queue::QueueHandler;
pub use reminder::{ReminderTriggerHandler, TriggerResponse};
pub use send::SendHandler;
pub use template::TemplateHandler;

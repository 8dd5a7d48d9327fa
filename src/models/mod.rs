//! Communication Dispatch Models

pub mod message;
pub mod settings;
pub mod template;
pub mod queue;
pub mod log;
pub mod business;

pub use message::*;
pub use settings::*;
pub use template::*;
pub use queue::*;
pub use log::*;
pub use business::*;

//! Shared types for the GM chat engine: messages, scenario configs,
//! application config and the error taxonomy.

pub mod config;
pub mod error;
pub mod message;
pub mod scenario;

pub use config::{AppConfig, CompactionSettings};
pub use error::{GmError, Result};
pub use message::{count_non_system, ChatMessage, Message, Role};
pub use scenario::{ScenarioConfig, DEFAULT_MODEL};

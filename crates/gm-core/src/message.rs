//! Conversation messages, as persisted and as sent over the wire.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a session log.
///
/// `is_system_event` marks synthetic entries such as dice-roll notices. They
/// keep `role = user` so the model still sees them. Any other flags found in
/// persisted data are kept in `extra` so they survive a save/load cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "content_as_text")]
    pub content: String,
    #[serde(
        rename = "isSystemEvent",
        alias = "is_dice",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_system_event: bool,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_system_event: false,
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A synthetic user-visible event (e.g. a dice roll broadcast).
    pub fn system_event(content: impl Into<String>) -> Self {
        Self {
            is_system_event: true,
            ..Self::new(Role::User, content)
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Strip every flag, keeping only role and content.
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Wire form of a message: role and plain-text content, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Count the messages that are not system messages.
pub fn count_non_system(messages: &[Message]) -> usize {
    messages.iter().filter(|m| !m.is_system()).count()
}

// Older saves may hold structured content; flatten it to text on load.
fn content_as_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

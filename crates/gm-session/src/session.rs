use chrono::{DateTime, NaiveDateTime, Utc};
use gm_core::{count_non_system, Message, ScenarioConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One conversation thread: its canonical log (seed system messages first),
/// its long-term memory and the scenario it was started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "timestamp", with = "timestamp", default = "Utc::now")]
    pub last_touched: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(rename = "longTermMemory", alias = "long_term_memory", default)]
    pub long_term_memory: String,
    #[serde(rename = "scenarioRef", default, skip_serializing_if = "Option::is_none")]
    pub scenario_ref: Option<String>,
    /// Embedded config for sessions imported from legacy saves, which
    /// carried the whole config instead of a reference.
    #[serde(rename = "scenarioConfig", default, skip_serializing_if = "Option::is_none")]
    pub scenario_config: Option<ScenarioConfig>,
}

impl Session {
    /// New session seeded with the scenario's initial messages.
    pub fn new(scenario: &ScenarioConfig, scenario_ref: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: default_name(&scenario.name, now),
            last_touched: now,
            messages: scenario.initial_messages.clone(),
            long_term_memory: String::new(),
            scenario_ref,
            scenario_config: None,
        }
    }

    pub fn with_id(id: impl Into<String>, scenario: &ScenarioConfig) -> Self {
        let mut s = Self::new(scenario, None);
        s.id = id.into();
        s
    }

    pub fn touch(&mut self) {
        self.last_touched = Utc::now();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Re-seed from a scenario, dropping messages and memory.
    pub fn reset(&mut self, scenario: &ScenarioConfig, scenario_ref: Option<String>) {
        self.messages = scenario.initial_messages.clone();
        self.long_term_memory.clear();
        self.scenario_ref = scenario_ref;
        self.scenario_config = None;
        self.name = default_name(&scenario.name, Utc::now());
        self.touch();
    }

    /// Replace the log and memory with a compaction result.
    pub fn apply_compaction(&mut self, messages: Vec<Message>, summary: String) {
        self.messages = messages;
        self.long_term_memory = summary;
        self.touch();
    }

    pub fn rename(&mut self, name: &str) {
        let label = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if !label.is_empty() {
            self.name = label.chars().take(MAX_NAME_CHARS).collect();
            self.touch();
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Messages that count toward the history threshold.
    pub fn chat_count(&self) -> usize {
        count_non_system(&self.messages)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session(id={}, name={:?}, messages={})", self.id, self.name, self.messages.len())
    }
}

const MAX_NAME_CHARS: usize = 64;

fn default_name(scenario_name: &str, at: DateTime<Utc>) -> String {
    format!("{} · {}", scenario_name, at.format("%m-%d %H:%M"))
}

/// `"%Y-%m-%d %H:%M:%S"` on write; that or RFC 3339 on read. Timestamps are
/// informational, so anything unreadable becomes "now".
pub(crate) mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&at.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(parse(&raw))
    }

    pub fn parse(raw: &str) -> DateTime<Utc> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FORMAT) {
            return naive.and_utc();
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return at.with_timezone(&Utc);
        }
        if !raw.is_empty() {
            tracing::warn!(timestamp = %raw, "unreadable timestamp, using current time");
        }
        Utc::now()
    }
}

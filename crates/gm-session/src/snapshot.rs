//! Persisted snapshot formats.
//!
//! Current format:
//! `{"sessions": {id: {id, name, timestamp, messages, longTermMemory, scenarioRef}},
//!   "currentSessionId": id}`
//!
//! Legacy single-session format, still accepted on load:
//! `{"timestamp", "messages", "longTermMemory", "scenarioConfig"}`.
//!
//! A load either yields a complete store or fails with
//! [`GmError::Corrupt`]; nothing is ever partially adopted.

use crate::session::{timestamp, Session};
use crate::store::SessionStore;
use gm_core::{GmError, Message, Result, ScenarioConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    MultiSession,
    Legacy,
}

/// A successfully loaded snapshot.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub store: SessionStore,
    /// Config embedded in a legacy save (or the default when it had none).
    pub scenario: Option<ScenarioConfig>,
    pub format: SnapshotFormat,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    sessions: BTreeMap<&'a str, &'a Session>,
    #[serde(rename = "currentSessionId")]
    current_session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    timestamp: Option<String>,
    messages: Vec<Message>,
    #[serde(rename = "longTermMemory", alias = "long_term_memory", default)]
    long_term_memory: String,
    #[serde(rename = "scenarioConfig", alias = "mask_config", default)]
    scenario_config: Option<ScenarioConfig>,
}

fn corrupt(msg: impl Into<String>) -> GmError {
    GmError::Corrupt(msg.into())
}

impl SessionStore {
    pub fn to_snapshot_value(&self) -> Result<Value> {
        let out = SnapshotOut {
            sessions: self.sessions.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            current_session_id: self.current.as_deref(),
        };
        Ok(serde_json::to_value(out)?)
    }

    /// Serialize the whole store.
    pub fn export(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_snapshot_value()?)?)
    }
}

/// Parse a snapshot in either format.
pub fn load_snapshot(bytes: &[u8]) -> Result<LoadedState> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("not valid JSON: {e}")))?;
    load_snapshot_value(value)
}

pub fn load_snapshot_value(value: Value) -> Result<LoadedState> {
    let Value::Object(mut root) = value else {
        return Err(corrupt("snapshot must be a JSON object"));
    };

    if let Some(sessions) = root.remove("sessions") {
        let current = root.remove("currentSessionId");
        return load_multi_session(sessions, current);
    }
    if root.contains_key("messages") {
        return load_legacy(Value::Object(root));
    }
    Err(corrupt("snapshot has neither `sessions` nor `messages`"))
}

fn load_multi_session(sessions: Value, current: Option<Value>) -> Result<LoadedState> {
    let Value::Object(entries) = sessions else {
        return Err(corrupt("`sessions` must be an object"));
    };

    let mut store = SessionStore::new();
    for (key, raw) in entries {
        let mut session: Session =
            serde_json::from_value(raw).map_err(|e| corrupt(format!("session {key}: {e}")))?;
        if session.id.is_empty() {
            session.id = key.clone();
        } else if session.id != key {
            return Err(corrupt(format!("session {key} carries mismatched id {}", session.id)));
        }
        store.sessions.insert(key, session);
    }

    let current = match current {
        Some(Value::String(id)) => Some(id),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(corrupt(format!(
                "`currentSessionId` must be a string, got {other}"
            )))
        }
    };
    match current {
        Some(id) if store.sessions.contains_key(&id) => store.current = Some(id),
        Some(id) => return Err(corrupt(format!("current session {id} is not in `sessions`"))),
        None if store.sessions.is_empty() => {}
        None => return Err(corrupt("missing `currentSessionId`")),
    }

    tracing::info!(sessions = store.count(), "loaded session snapshot");
    Ok(LoadedState {
        store,
        scenario: None,
        format: SnapshotFormat::MultiSession,
    })
}

fn load_legacy(value: Value) -> Result<LoadedState> {
    let legacy: LegacySnapshot =
        serde_json::from_value(value).map_err(|e| corrupt(format!("legacy save: {e}")))?;
    let scenario = legacy.scenario_config.unwrap_or_default();

    let session = Session {
        id: Uuid::new_v4().to_string(),
        name: format!("{} (imported)", scenario.name),
        last_touched: timestamp::parse(legacy.timestamp.as_deref().unwrap_or_default()),
        messages: legacy.messages,
        long_term_memory: legacy.long_term_memory,
        scenario_ref: None,
        scenario_config: Some(scenario.clone()),
    };
    let mut store = SessionStore::new();
    store.insert(session, true);

    tracing::info!("loaded legacy single-session save");
    Ok(LoadedState {
        store,
        scenario: Some(scenario),
        format: SnapshotFormat::Legacy,
    })
}

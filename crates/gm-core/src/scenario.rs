//! Scenario ("mask") configuration: model parameters plus seed prompt
//! material for one campaign.

use crate::error::{GmError, Result};
use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_SCENARIO_NAME: &str = "Untitled Scenario";
pub const DEFAULT_SEED_PROMPT: &str =
    "You are a cold, ruthless Game Master for a Blades in the Dark campaign.";
pub const DEFAULT_HISTORY_MESSAGE_COUNT: usize = 20;

/// Model parameters and seed prompts for a scenario.
///
/// Also the shape stored inside legacy single-session saves, hence the
/// snake_case aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub model: String,
    pub temperature: f32,
    #[serde(rename = "topP", alias = "top_p")]
    pub top_p: f32,
    #[serde(rename = "maxTokens", alias = "max_tokens")]
    pub max_tokens: u32,
    #[serde(rename = "presencePenalty", alias = "presence_penalty")]
    pub presence_penalty: f32,
    #[serde(rename = "frequencyPenalty", alias = "frequency_penalty")]
    pub frequency_penalty: f32,
    #[serde(rename = "historyMessageCount")]
    pub history_message_count: usize,
    #[serde(rename = "initialMessages", alias = "initial_messages")]
    pub initial_messages: Vec<Message>,
    #[serde(rename = "tailPrompt")]
    pub tail_prompt: String,
    #[serde(rename = "negativeConstraints")]
    pub negative_constraints: Vec<String>,
    pub glossary: BTreeMap<String, String>,
    /// Bumped every time [`ScenarioConfig::merge`] fills a field.
    pub revision: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCENARIO_NAME.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 4000,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            history_message_count: DEFAULT_HISTORY_MESSAGE_COUNT,
            initial_messages: vec![Message::system(DEFAULT_SEED_PROMPT)],
            tail_prompt: String::new(),
            negative_constraints: Vec::new(),
            glossary: BTreeMap::new(),
            revision: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MaskDocument {
    name: Option<String>,
    context: Vec<ContextEntry>,
    #[serde(rename = "modelConfig")]
    model_config: MaskModelConfig,
    #[serde(rename = "tailPrompt")]
    tail_prompt: Option<String>,
    #[serde(rename = "negativeConstraints")]
    negative_constraints: Vec<String>,
    glossary: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextEntry {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MaskModelConfig {
    model: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
    #[serde(rename = "historyMessageCount")]
    history_message_count: Option<usize>,
}

impl ScenarioConfig {
    /// Parse a scenario document, unwrapping a `{"masks": [...]}` envelope.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| GmError::Configuration(format!("invalid scenario JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let doc = match value {
            Value::Object(mut map) => match map.remove("masks") {
                Some(Value::Array(mut masks)) if !masks.is_empty() => masks.swap_remove(0),
                Some(Value::Array(_)) => {
                    return Err(GmError::Configuration("scenario collection is empty".into()))
                }
                Some(other) => {
                    map.insert("masks".into(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            },
            other => {
                return Err(GmError::Configuration(format!(
                    "scenario must be a JSON object, got {other}"
                )))
            }
        };
        let doc: MaskDocument = serde_json::from_value(doc)
            .map_err(|e| GmError::Configuration(format!("malformed scenario: {e}")))?;

        let defaults = Self::default();
        let mut initial_messages: Vec<Message> = doc
            .context
            .into_iter()
            .filter_map(|entry| {
                let role = match entry.role.as_deref()? {
                    "system" => Role::System,
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    _ => return None,
                };
                let content = entry.content.filter(|c| !c.is_empty())?;
                Some(Message::new(role, content))
            })
            .collect();
        if initial_messages.is_empty() {
            initial_messages = defaults.initial_messages.clone();
        }

        let mc = doc.model_config;
        Ok(Self {
            name: doc.name.unwrap_or(defaults.name),
            model: mc.model.unwrap_or(defaults.model),
            temperature: mc.temperature.unwrap_or(defaults.temperature),
            top_p: mc.top_p.unwrap_or(defaults.top_p),
            max_tokens: mc.max_tokens.unwrap_or(defaults.max_tokens),
            presence_penalty: mc.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: mc.frequency_penalty.unwrap_or(defaults.frequency_penalty),
            history_message_count: mc
                .history_message_count
                .unwrap_or(defaults.history_message_count)
                .max(1),
            initial_messages,
            tail_prompt: doc.tail_prompt.unwrap_or_default(),
            negative_constraints: doc.negative_constraints,
            glossary: doc.glossary,
            revision: 0,
        })
    }

    /// True when any of glossary, constraints or tail prompt is set.
    pub fn has_extensions(&self) -> bool {
        !self.glossary.is_empty()
            || !self.negative_constraints.is_empty()
            || !self.tail_prompt.trim().is_empty()
    }

    /// Fill the optional extension fields that are absent here from a
    /// freshly parsed copy of the same source. Fields already set are never
    /// overwritten, and model parameters always stay from the original load.
    pub fn merge(&self, refreshed: &ScenarioConfig) -> ScenarioConfig {
        let mut merged = self.clone();
        let mut filled = false;
        if merged.tail_prompt.trim().is_empty() && !refreshed.tail_prompt.trim().is_empty() {
            merged.tail_prompt = refreshed.tail_prompt.clone();
            filled = true;
        }
        if merged.negative_constraints.is_empty() && !refreshed.negative_constraints.is_empty() {
            merged.negative_constraints = refreshed.negative_constraints.clone();
            filled = true;
        }
        if merged.glossary.is_empty() && !refreshed.glossary.is_empty() {
            merged.glossary = refreshed.glossary.clone();
            filled = true;
        }
        if filled {
            merged.revision += 1;
            tracing::debug!(
                scenario = %merged.name,
                revision = merged.revision,
                "merged refreshed scenario fields"
            );
        }
        merged
    }
}

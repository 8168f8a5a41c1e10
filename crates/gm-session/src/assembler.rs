//! Prompt assembly: the exact ordered payload for one completion call.
//!
//! Order:
//! 1. system messages of the log
//! 2. long-term memory, if any
//! 3. user/assistant messages of the log
//! 4. glossary, 5. negative constraints, 6. tail prompt
//!
//! The tail prompt is always last so it is the most recent instruction the
//! model sees.

use gm_core::{ChatMessage, Message, ScenarioConfig};

pub const PRIOR_CONTEXT_LABEL: &str = "[Previously / Long Term Memory]";
pub const GLOSSARY_HEADING: &str = "[Glossary] Always use these translations:";
pub const CONSTRAINTS_HEADING: &str = "[Constraints] You must obey these prohibitions:";
pub const CONSTRAINT_PREFIX: &str = "- DO NOT: ";

/// Builds completion payloads. Stateless; the same inputs always produce
/// the same payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn assemble(
        messages: &[Message],
        summary: &str,
        scenario: &ScenarioConfig,
    ) -> Vec<ChatMessage> {
        let mut payload: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.is_system())
            .map(Message::to_chat)
            .collect();

        if let Some(memory) = Self::memory_segment(summary) {
            payload.push(memory);
        }

        payload.extend(messages.iter().filter(|m| !m.is_system()).map(Message::to_chat));

        payload.extend(Self::extension_segments(scenario));
        payload
    }

    /// The prior-context segment wrapping the summary, if non-empty.
    pub fn memory_segment(summary: &str) -> Option<ChatMessage> {
        if summary.trim().is_empty() {
            return None;
        }
        Some(ChatMessage::system(format!("{PRIOR_CONTEXT_LABEL}\n{summary}")))
    }

    /// Glossary, constraints and tail prompt segments, in that order.
    pub fn extension_segments(scenario: &ScenarioConfig) -> Vec<ChatMessage> {
        let mut segments = Vec::with_capacity(3);

        if !scenario.glossary.is_empty() {
            let mut text = GLOSSARY_HEADING.to_string();
            for (term, translation) in &scenario.glossary {
                text.push('\n');
                text.push_str(&format!("{term} = {translation}"));
            }
            segments.push(ChatMessage::system(text));
        }

        let constraints: Vec<&str> = scenario
            .negative_constraints
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if !constraints.is_empty() {
            let mut text = CONSTRAINTS_HEADING.to_string();
            for constraint in constraints {
                text.push('\n');
                text.push_str(CONSTRAINT_PREFIX);
                text.push_str(constraint);
            }
            segments.push(ChatMessage::system(text));
        }

        if !scenario.tail_prompt.trim().is_empty() {
            segments.push(ChatMessage::system(scenario.tail_prompt.clone()));
        }

        segments
    }
}

//! Summarization prompt.

use gm_core::{ChatMessage, Message, Role};
use gm_llm::SummaryRequest;

/// Output cap for one summary call.
pub const SUMMARY_MAX_TOKENS: u32 = 1000;

pub const CHRONICLER_PROMPT: &str =
    "You are a meticulous chronicler for a tabletop roleplaying campaign.";

pub const SUMMARY_INSTRUCTION: &str = "Briefly summarize the story so far: what happened, \
    the key decisions made, and the current situation. Keep the names of NPCs and places, \
    important items, and the consequences of the players' actions. \
    Do not leave out key information.";

/// Build the summary request for `to_compress`, folding in `prior_summary`
/// so the result is cumulative. Only user and assistant turns are sent, as
/// bare role/content pairs.
pub fn build_summary_request(
    model: &str,
    to_compress: &[&Message],
    prior_summary: &str,
    max_tokens: u32,
) -> SummaryRequest {
    let mut messages = Vec::with_capacity(to_compress.len() + 2);
    messages.push(ChatMessage::system(CHRONICLER_PROMPT));
    messages.extend(
        to_compress
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| m.to_chat()),
    );

    let mut instruction = SUMMARY_INSTRUCTION.to_string();
    if !prior_summary.trim().is_empty() {
        instruction.push_str("\n\nKnown summary of earlier events:\n");
        instruction.push_str(prior_summary);
    }
    messages.push(ChatMessage::user(instruction));

    SummaryRequest {
        model: model.to_string(),
        messages,
        max_tokens,
    }
}

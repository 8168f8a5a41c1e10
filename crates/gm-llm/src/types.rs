use async_trait::async_trait;
use futures::Stream;
use gm_core::{ChatMessage, ScenarioConfig};
use std::pin::Pin;

/// Lazy sequence of text fragments from a streaming completion. Any item may
/// be an error; the stream may also simply stop.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// One streaming chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl CompletionRequest {
    /// Pair an assembled payload with the scenario's model parameters.
    pub fn for_scenario(scenario: &ScenarioConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: scenario.model.clone(),
            messages,
            temperature: scenario.temperature,
            top_p: scenario.top_p,
            max_tokens: scenario.max_tokens,
            presence_penalty: scenario.presence_penalty,
            frequency_penalty: scenario.frequency_penalty,
        }
    }
}

/// One summarization call; the prompt is already built by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streaming completion. Errors before the first chunk are
    /// returned here; later ones arrive through the stream.
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> anyhow::Result<String>;
}

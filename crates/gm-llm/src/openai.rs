//! OpenAI-compatible `/chat/completions` client.
//!
//! Works with any endpoint speaking the same wire format (OpenAI, Gemini's
//! OpenAI shim, local proxies).

use crate::sse;
use crate::types::{ChunkStream, CompletionClient, CompletionRequest, SummaryRequest, Summarizer};
use anyhow::{bail, Context};
use async_trait::async_trait;
use gm_core::config::ApiConfig;
use gm_core::ChatMessage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on a whole non-streaming summary call.
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    summary_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
        }
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    pub fn from_config(api: &ApiConfig) -> Self {
        Self::new(&api.base_url, api.api_key.as_deref())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(
        &self,
        body: &ApiRequest<'_>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<reqwest::Response> {
        let mut req = self.client.post(self.endpoint()).json(body);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.context("chat completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "chat completion rejected");
            bail!("HTTP {status}: {body}");
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
        tracing::debug!(
            model = %request.model,
            segments = request.messages.len(),
            max_tokens = request.max_tokens,
            "streaming completion request"
        );
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            temperature: Some(request.temperature),
            top_p: Some(request.top_p),
            max_tokens: request.max_tokens,
            presence_penalty: Some(request.presence_penalty),
            frequency_penalty: Some(request.frequency_penalty),
        };
        // No overall timeout: a long narration may legitimately stream for minutes.
        let response = self.post(&body, None).await?;
        Ok(sse::text_deltas(Box::pin(response.bytes_stream())))
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, request: SummaryRequest) -> anyhow::Result<String> {
        tracing::debug!(
            model = %request.model,
            segments = request.messages.len(),
            "summary request"
        );
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: request.max_tokens,
            presence_penalty: None,
            frequency_penalty: None,
        };
        let response: ApiResponse = self
            .post(&body, Some(self.summary_timeout))
            .await?
            .json()
            .await
            .context("malformed summary response")?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("summary response had no content")
    }
}

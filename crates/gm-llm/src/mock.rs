//! Scripted in-memory model clients for tests and offline runs.

use crate::types::{ChunkStream, CompletionClient, CompletionRequest, SummaryRequest, Summarizer};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

/// What a scripted completion does when called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Yield the chunks, then end normally.
    Chunks(Vec<String>),
    /// Yield the chunks, then fail mid-stream.
    FailAfter(Vec<String>, String),
    /// Fail before streaming anything.
    Reject(String),
    /// Yield the chunks, then hang until cancelled.
    Stall(Vec<String>),
}

impl Script {
    pub fn reply(text: &str) -> Self {
        Script::Chunks(text.split_inclusive(' ').map(String::from).collect())
    }
}

/// Completion client that plays back queued scripts in order.
#[derive(Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn chunk_stream(chunks: Vec<String>) -> impl futures::Stream<Item = anyhow::Result<String>> + Send {
    stream::iter(chunks.into_iter().map(Ok))
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(chunks)) => Ok(Box::pin(chunk_stream(chunks))),
            Some(Script::FailAfter(chunks, message)) => Ok(Box::pin(
                chunk_stream(chunks)
                    .chain(stream::once(async move { Err(anyhow::anyhow!(message)) })),
            )),
            Some(Script::Reject(message)) => Err(anyhow::anyhow!(message)),
            Some(Script::Stall(chunks)) => {
                Ok(Box::pin(chunk_stream(chunks).chain(stream::pending())))
            }
            None => Err(anyhow::anyhow!("no scripted completion left")),
        }
    }
}

/// Summarizer returning a fixed reply, or failing every time.
pub struct ScriptedSummarizer {
    reply: Result<String, String>,
    requests: Mutex<Vec<SummaryRequest>>,
}

impl ScriptedSummarizer {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

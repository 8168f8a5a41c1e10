//! Server-sent-events decoding for chat-completion streams.
//!
//! Turns the raw byte stream into the text deltas found under
//! `choices[0].delta.content`, stopping at `data: [DONE]`.

use crate::types::ChunkStream;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum LineEvent {
    Skip,
    Done,
    Text(String),
    Error(String),
}

fn parse_line(raw: &[u8]) -> LineEvent {
    let Ok(line) = std::str::from_utf8(raw) else {
        return LineEvent::Skip;
    };
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineEvent::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                let message = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| err.to_string());
                return LineEvent::Error(message);
            }
            match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                Some(text) if !text.is_empty() => LineEvent::Text(text),
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            tracing::warn!(line = %data, error = %e, "skipping unparsable SSE event");
            LineEvent::Skip
        }
    }
}

struct SseState<S> {
    inner: S,
    buffer: Vec<u8>,
    finished: bool,
}

/// Decode an SSE byte stream into text deltas.
pub fn text_deltas<S, B, E>(inner: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        inner,
        buffer: Vec::with_capacity(8192),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match parse_line(&line) {
                    LineEvent::Skip => continue,
                    LineEvent::Done => return None,
                    LineEvent::Text(text) => return Some((Ok(text), state)),
                    LineEvent::Error(message) => {
                        state.finished = true;
                        state.buffer.clear();
                        return Some((Err(anyhow::anyhow!("provider error: {message}")), state));
                    }
                }
            }

            if state.finished {
                // Trailing line without a newline terminator.
                let rest = std::mem::take(&mut state.buffer);
                return match parse_line(&rest) {
                    LineEvent::Text(text) => Some((Ok(text), state)),
                    LineEvent::Error(message) => {
                        Some((Err(anyhow::anyhow!("provider error: {message}")), state))
                    }
                    LineEvent::Skip | LineEvent::Done => None,
                };
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(anyhow::anyhow!("stream interrupted: {e}")), state));
                }
                None => state.finished = true,
            }
        }
    }))
}

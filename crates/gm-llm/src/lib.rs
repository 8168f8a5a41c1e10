//! Model-call contracts used by the engine and an OpenAI-compatible client
//! that fulfils them.
//!
//! - [`CompletionClient`]: streaming chat completion, yields text chunks.
//! - [`Summarizer`]: one-shot, bounded-length summary call.

pub mod mock;
pub mod openai;
pub mod sse;
pub mod types;

pub use openai::OpenAiClient;
pub use types::{ChunkStream, CompletionClient, CompletionRequest, SummaryRequest, Summarizer};

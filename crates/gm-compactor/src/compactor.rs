//! Threshold-driven history compaction.

use crate::prompt::{build_summary_request, SUMMARY_MAX_TOKENS};
use gm_core::{count_non_system, CompactionSettings, Message};
use gm_llm::Summarizer;

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Below the trigger; log and summary returned untouched.
    Skipped,
    /// History truncated and the summary replaced by the summarizer's reply.
    Summarized,
    /// History truncated, summarizer failed, prior summary kept as-is.
    SummaryFailed,
}

/// New canonical log and summary after one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionResult {
    /// System messages (original order) followed by the kept messages.
    pub kept_messages: Vec<Message>,
    pub updated_summary: String,
    pub outcome: CompactionOutcome,
    /// Number of messages folded into the summary.
    pub compressed_count: usize,
}

impl CompactionResult {
    pub fn changed(&self) -> bool {
        self.outcome != CompactionOutcome::Skipped
    }
}

/// A log split by the partition policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<'a> {
    pub system: Vec<&'a Message>,
    pub to_compress: Vec<&'a Message>,
    pub to_keep: Vec<&'a Message>,
}

/// Context compactor with configurable margin and keep floor.
#[derive(Debug, Clone)]
pub struct ContextCompactor {
    pub settings: CompactionSettings,
    pub summary_max_tokens: u32,
}

impl ContextCompactor {
    pub fn new(settings: CompactionSettings) -> Self {
        Self {
            settings,
            summary_max_tokens: SUMMARY_MAX_TOKENS,
        }
    }

    pub fn with_margin(mut self, margin: usize) -> Self {
        self.settings.margin = margin;
        self
    }

    pub fn with_minimum_keep(mut self, minimum_keep: usize) -> Self {
        self.settings.minimum_keep = minimum_keep;
        self
    }

    /// Recent messages retained verbatim for a given threshold.
    pub fn keep_count(&self, threshold: usize) -> usize {
        (threshold.max(1) / 2).max(self.settings.minimum_keep)
    }

    /// Whether the non-system count is past `threshold + margin`.
    pub fn should_compact(&self, messages: &[Message], threshold: usize) -> bool {
        count_non_system(messages) > threshold.max(1) + self.settings.margin
    }

    /// Split the log into system messages, the oldest non-system messages to
    /// summarize, and the most recent ones to keep.
    pub fn partition<'a>(&self, messages: &'a [Message], threshold: usize) -> Partition<'a> {
        let (system, chat): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.is_system());
        let split = chat.len().saturating_sub(self.keep_count(threshold));
        let (to_compress, to_keep) = chat.split_at(split);
        Partition {
            system,
            to_compress: to_compress.to_vec(),
            to_keep: to_keep.to_vec(),
        }
    }

    /// Run one compaction pass.
    ///
    /// Never fails: if the summarizer errors or returns nothing, the prior
    /// summary is kept unchanged and the log is still truncated.
    pub async fn compact(
        &self,
        messages: &[Message],
        summary: &str,
        threshold: usize,
        model: &str,
        summarizer: &dyn Summarizer,
    ) -> CompactionResult {
        let unchanged = || CompactionResult {
            kept_messages: messages.to_vec(),
            updated_summary: summary.to_string(),
            outcome: CompactionOutcome::Skipped,
            compressed_count: 0,
        };

        if !self.should_compact(messages, threshold) {
            return unchanged();
        }
        let partition = self.partition(messages, threshold);
        if partition.to_compress.is_empty() {
            return unchanged();
        }

        tracing::info!(
            threshold,
            compress = partition.to_compress.len(),
            keep = partition.to_keep.len(),
            "compacting history"
        );

        let request = build_summary_request(
            model,
            &partition.to_compress,
            summary,
            self.summary_max_tokens,
        );
        let (updated_summary, outcome) = match summarizer.summarize(request).await {
            Ok(text) if !text.trim().is_empty() => {
                (text.trim().to_string(), CompactionOutcome::Summarized)
            }
            Ok(_) => {
                tracing::warn!("summarizer returned an empty summary; keeping prior summary");
                (summary.to_string(), CompactionOutcome::SummaryFailed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed; keeping prior summary");
                (summary.to_string(), CompactionOutcome::SummaryFailed)
            }
        };

        let kept_messages = partition
            .system
            .iter()
            .chain(partition.to_keep.iter())
            .map(|m| (*m).clone())
            .collect();

        CompactionResult {
            kept_messages,
            updated_summary,
            outcome,
            compressed_count: partition.to_compress.len(),
        }
    }
}

impl Default for ContextCompactor {
    fn default() -> Self {
        Self::new(CompactionSettings::default())
    }
}

//! Context compactor: keeps a session log bounded by folding its oldest
//! messages into a running natural-language summary.
//!
//! One pass:
//! 1. Count non-system messages; do nothing unless the count exceeds
//!    `threshold + margin`.
//! 2. Keep the most recent `max(threshold / 2, minimum_keep)` messages.
//! 3. Ask the summarizer to fold the rest into the prior summary.
//! 4. Rebuild the log as system messages followed by the kept messages.

pub mod compactor;
pub mod prompt;

pub use compactor::{CompactionOutcome, CompactionResult, ContextCompactor, Partition};

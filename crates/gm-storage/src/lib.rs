//! Key-value persistence over opaque blobs.
//!
//! The engine only needs load/save/delete of whole JSON snapshots; where the
//! bytes live (a data directory, memory, a browser bridge) is up to the
//! [`KvStore`] implementation.

pub mod file_store;
pub mod memory;

pub use file_store::FileKvStore;
pub use memory::MemoryKvStore;

use async_trait::async_trait;
use gm_core::Result;

/// Result of a load. `Pending` means the backend cannot yet tell whether the
/// key exists; callers must not write until they see `Found` or `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Found(Vec<u8>),
    NotFound,
    Pending,
}

impl LoadOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, LoadOutcome::Pending)
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<LoadOutcome>;
    /// Whole-value overwrite; last write wins.
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Keys become file names, so keep them to a safe alphabet.
pub fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(gm_core::GmError::Storage(format!("invalid key: {key:?}")))
    }
}

//! One JSON file per key inside a data directory.

use crate::{validate_key, KvStore, LoadOutcome};
use async_trait::async_trait;
use gm_core::{GmError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = "json";

pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{EXTENSION}"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.{EXTENSION}.tmp"))
    }
}

fn io_err(action: &str, path: &Path, e: std::io::Error) -> GmError {
    GmError::Storage(format!("{action} {}: {e}", path.display()))
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn load(&self, key: &str) -> Result<LoadOutcome> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(data) => Ok(LoadOutcome::Found(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // A first write that has not been renamed into place yet.
                if fs::try_exists(self.temp_path_for(key)).await.unwrap_or(false) {
                    Ok(LoadOutcome::Pending)
                } else {
                    Ok(LoadOutcome::NotFound)
                }
            }
            Err(e) => Err(io_err("read", &path, e)),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err("create", &self.root, e))?;
        let tmp = self.temp_path_for(key);
        let path = self.path_for(key);
        fs::write(&tmp, value).await.map_err(|e| io_err("write", &tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_err("rename", &path, e))?;
        tracing::debug!(key, bytes = value.len(), "saved blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("delete", &path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("list", &self.root, e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_err("list", &self.root, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json") {
                if !key.starts_with('.') {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

//! Where scenario documents come from.

use async_trait::async_trait;
use gm_core::{GmError, Result, ScenarioConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::fs;

#[async_trait]
pub trait ScenarioSource: Send + Sync {
    /// References of every available scenario.
    async fn list(&self) -> Result<Vec<String>>;
    /// Parse the scenario behind `reference`.
    async fn load(&self, reference: &str) -> Result<ScenarioConfig>;
}

/// Scenario JSON files in a directory; the reference is the file name.
pub struct DirScenarioSource {
    dir: PathBuf,
}

impl DirScenarioSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScenarioSource for DirScenarioSource {
    async fn list(&self) -> Result<Vec<String>> {
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "cannot create scenario directory"
            );
            return Ok(Vec::new());
        }
        let mut dir = fs::read_dir(&self.dir).await.map_err(|e| {
            GmError::Configuration(format!("cannot list {}: {e}", self.dir.display()))
        })?;
        let mut names = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load(&self, reference: &str) -> Result<ScenarioConfig> {
        if reference.is_empty() || reference.contains(['/', '\\']) || reference.starts_with('.') {
            return Err(GmError::Configuration(format!(
                "invalid scenario reference: {reference:?}"
            )));
        }
        let path = self.dir.join(reference);
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|e| GmError::Configuration(format!("cannot read {}: {e}", path.display())))?;
        let config = ScenarioConfig::parse(&raw)?;
        tracing::debug!(reference, scenario = %config.name, "loaded scenario");
        Ok(config)
    }
}

/// In-memory scenario documents keyed by reference. Documents can be
/// replaced at runtime, which makes it handy for exercising hot reload.
#[derive(Default)]
pub struct StaticScenarioSource {
    documents: RwLock<BTreeMap<String, String>>,
}

impl StaticScenarioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, reference: &str, json: impl Into<String>) -> Self {
        self.set(reference, json);
        self
    }

    pub fn set(&self, reference: &str, json: impl Into<String>) {
        self.documents.write().unwrap().insert(reference.to_string(), json.into());
    }
}

#[async_trait]
impl ScenarioSource for StaticScenarioSource {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.documents.read().unwrap().keys().cloned().collect())
    }

    async fn load(&self, reference: &str) -> Result<ScenarioConfig> {
        let raw = self
            .documents
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GmError::Configuration(format!("unknown scenario: {reference}")))?;
        ScenarioConfig::parse(&raw)
    }
}

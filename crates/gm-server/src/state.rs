//! Application state shared across all handlers.

use gm_compactor::ContextCompactor;
use anyhow::{bail, Context};
use gm_core::{AppConfig, GmError};
use gm_llm::OpenAiClient;
use gm_session::{DirScenarioSource, HydrateStatus, TurnOrchestrator};
use gm_storage::FileKvStore;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<tokio::sync::Mutex<TurnOrchestrator>>,
    /// Cancellation handle of the turn in flight, if any.
    pub active_turn: Arc<Mutex<Option<CancellationToken>>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: TurnOrchestrator) -> Self {
        Self {
            engine: Arc::new(tokio::sync::Mutex::new(engine)),
            active_turn: Arc::new(Mutex::new(None)),
            start_time: std::time::Instant::now(),
        }
    }

    /// Wire the file store, scenario directory and OpenAI-compatible client
    /// described by `config`. The engine still needs hydrating.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = Arc::new(OpenAiClient::from_config(&config.api));
        if !client.has_api_key() {
            tracing::warn!("API_KEY is not set; completion calls will be rejected upstream");
        }
        let engine = TurnOrchestrator::new(
            Arc::new(FileKvStore::new(&config.storage.data_dir)),
            client.clone(),
            client,
            Arc::new(DirScenarioSource::new(&config.storage.scenario_dir)),
        )
        .with_compactor(ContextCompactor::new(config.compaction));
        Self::new(engine)
    }

    /// Load persisted sessions before serving. A corrupt snapshot is logged
    /// and replaced by a fresh store. Storage that cannot answer yet (an
    /// interrupted write left only its temp file) is a startup error: the
    /// server never writes over state it has not read.
    pub async fn hydrate(&self) -> anyhow::Result<HydrateStatus> {
        let mut engine = self.engine.lock().await;
        match engine.hydrate().await {
            Ok(HydrateStatus::Pending) => bail!(
                "persisted sessions are pending an interrupted write; \
                 restore or remove the temp file and restart"
            ),
            Ok(status) => {
                if let HydrateStatus::Restored { sessions } = status {
                    tracing::info!(sessions, "restored persisted sessions");
                }
                Ok(status)
            }
            Err(GmError::Corrupt(reason)) => {
                tracing::error!(%reason, "persisted sessions are corrupt, starting fresh");
                engine.start_fresh();
                Ok(HydrateStatus::Fresh)
            }
            Err(e) => Err(e).context("failed to load persisted sessions"),
        }
    }

    /// Register a new turn. `None` when one is already running.
    pub fn begin_turn(&self) -> Option<TurnGuard> {
        let mut slot = self.active_turn.lock().unwrap();
        if slot.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Some(TurnGuard {
            token,
            slot: self.active_turn.clone(),
        })
    }

    /// Cancel the turn in flight. Returns whether there was one.
    pub fn abort_turn(&self) -> bool {
        match self.active_turn.lock().unwrap().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Holds the turn slot; releases it on drop, including when the request
/// future is dropped mid-turn.
pub struct TurnGuard {
    pub token: CancellationToken,
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

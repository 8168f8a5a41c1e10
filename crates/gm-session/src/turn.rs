//! Turn orchestration: one user input through compaction, assembly and a
//! streamed completion, with persistence at each checkpoint.
//!
//! Phases: `Idle → UserAppended → Compacting → Assembling → Streaming →
//! Completed | Failed`. The user message is persisted before anything can
//! fail downstream and is never rolled back.

use crate::assembler::PromptAssembler;
use crate::scenario_source::ScenarioSource;
use crate::session::Session;
use crate::snapshot::{load_snapshot, LoadedState};
use crate::store::{SessionStore, SessionSummary};
use futures::StreamExt;
use gm_compactor::{CompactionOutcome, ContextCompactor};
use gm_core::{GmError, Message, Result, ScenarioConfig};
use gm_llm::{CompletionClient, CompletionRequest, Summarizer};
use gm_storage::{KvStore, LoadOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Storage key of the session snapshot.
pub const SNAPSHOT_KEY: &str = "sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    UserAppended,
    Compacting,
    Assembling,
    Streaming,
    Completed,
    Failed,
}

/// Result of [`TurnOrchestrator::hydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateStatus {
    Restored { sessions: usize },
    Fresh,
    /// Storage could not answer yet; writes stay blocked.
    Pending,
}

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub session_id: String,
    pub reply: String,
    pub compaction: CompactionOutcome,
    pub compressed_count: usize,
}

/// Drives turns against the current session of a [`SessionStore`].
///
/// Taking `&mut self` for a turn guarantees at most one turn in flight.
pub struct TurnOrchestrator {
    store: SessionStore,
    scenario: ScenarioConfig,
    scenario_ref: Option<String>,
    kv: Arc<dyn KvStore>,
    completion: Arc<dyn CompletionClient>,
    summarizer: Arc<dyn Summarizer>,
    scenarios: Arc<dyn ScenarioSource>,
    compactor: ContextCompactor,
    hydrated: bool,
    phase: TurnPhase,
}

impl TurnOrchestrator {
    pub fn new(
        kv: Arc<dyn KvStore>,
        completion: Arc<dyn CompletionClient>,
        summarizer: Arc<dyn Summarizer>,
        scenarios: Arc<dyn ScenarioSource>,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            scenario: ScenarioConfig::default(),
            scenario_ref: None,
            kv,
            completion,
            summarizer,
            scenarios,
            compactor: ContextCompactor::default(),
            hydrated: false,
            phase: TurnPhase::Idle,
        }
    }

    pub fn with_compactor(mut self, compactor: ContextCompactor) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn scenario_ref(&self) -> Option<&str> {
        self.scenario_ref.as_deref()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.store.current()
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list()
    }

    pub async fn list_scenarios(&self) -> Result<Vec<String>> {
        self.scenarios.list().await
    }

    // ========== Persistence ==========

    /// Load persisted state. Until this resolves to `Restored` or `Fresh`
    /// (or [`start_fresh`](Self::start_fresh) is called) every write fails
    /// with [`GmError::NotHydrated`]. A corrupt snapshot is rejected whole and
    /// leaves the orchestrator unhydrated.
    pub async fn hydrate(&mut self) -> Result<HydrateStatus> {
        match self.kv.load(SNAPSHOT_KEY).await? {
            LoadOutcome::Found(bytes) => {
                let loaded = load_snapshot(&bytes)?;
                let sessions = loaded.store.count();
                self.adopt(loaded).await;
                self.hydrated = true;
                Ok(HydrateStatus::Restored { sessions })
            }
            LoadOutcome::NotFound => {
                self.hydrated = true;
                tracing::info!("no persisted sessions, starting fresh");
                Ok(HydrateStatus::Fresh)
            }
            LoadOutcome::Pending => {
                tracing::debug!("persisted sessions not available yet");
                Ok(HydrateStatus::Pending)
            }
        }
    }

    /// Discard whatever storage holds and start from defaults.
    pub fn start_fresh(&mut self) {
        self.store = SessionStore::new();
        self.hydrated = true;
        tracing::warn!("starting from a fresh session store");
    }

    async fn persist(&self) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let bytes = self.store.export()?;
        self.kv.save(SNAPSHOT_KEY, &bytes).await
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>> {
        self.store.export()
    }

    /// Replace all state with an uploaded snapshot (either format).
    pub async fn import_snapshot(&mut self, bytes: &[u8]) -> Result<()> {
        let loaded = load_snapshot(bytes)?;
        self.adopt(loaded).await;
        self.hydrated = true;
        self.persist().await
    }

    async fn adopt(&mut self, loaded: LoadedState) {
        self.store = loaded.store;
        if let Some(scenario) = loaded.scenario {
            self.scenario = scenario;
            self.scenario_ref = None;
        }
        self.activate_current_scenario().await;
    }

    /// Point the active scenario at whatever the current session uses: its
    /// reference, else its embedded config, else the defaults. A reference
    /// that no longer loads falls back like a session without one. With no
    /// current session the active scenario is left alone.
    async fn activate_current_scenario(&mut self) {
        let Some(session) = self.store.current() else {
            return;
        };
        let reference = session.scenario_ref.clone();
        let embedded = session.scenario_config.clone();

        if let Some(reference) = reference {
            match self.scenarios.load(&reference).await {
                Ok(config) => {
                    self.scenario = config;
                    self.scenario_ref = Some(reference);
                    return;
                }
                Err(e) => tracing::warn!(
                    scenario = %reference,
                    error = %e,
                    "cannot load session scenario, using fallback"
                ),
            }
        }
        self.scenario = embedded.unwrap_or_default();
        self.scenario_ref = None;
    }

    // ========== Sessions & scenarios ==========

    fn ensure_session(&mut self) -> String {
        if let Some(id) = self.store.current_id() {
            return id.to_string();
        }
        self.create_session()
    }

    /// New current session on the active scenario. Without a reference to
    /// reload from, a non-default scenario is embedded in the session.
    fn create_session(&mut self) -> String {
        let embedded = (self.scenario_ref.is_none() && self.scenario != ScenarioConfig::default())
            .then(|| self.scenario.clone());
        let session = self.store.create(&self.scenario, self.scenario_ref.clone());
        session.scenario_config = embedded;
        session.id.clone()
    }

    pub async fn new_session(&mut self) -> Result<String> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let id = self.create_session();
        self.persist().await?;
        Ok(id)
    }

    pub async fn switch_session(&mut self, id: &str) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        self.store.switch(id)?;
        self.activate_current_scenario().await;
        self.persist().await
    }

    pub async fn delete_session(&mut self, id: &str) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let was_current = self.store.current_id() == Some(id);
        self.store.delete(id)?;
        if was_current {
            self.activate_current_scenario().await;
        }
        self.persist().await
    }

    pub async fn rename_session(&mut self, id: &str, name: &str) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        self.store
            .get_mut(id)
            .ok_or_else(|| GmError::SessionNotFound { id: id.to_string() })?
            .rename(name);
        self.persist().await
    }

    /// Make `reference` the active scenario. The current session is re-seeded
    /// from it, unless that session already belongs to this scenario (a
    /// restored session wins over scenario defaults). A scenario that fails
    /// to load leaves everything untouched.
    pub async fn select_scenario(&mut self, reference: &str) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let config = self.scenarios.load(reference).await?;
        let reference = reference.to_string();

        match self.store.current_mut() {
            Some(session) if session.scenario_ref.as_deref() == Some(reference.as_str()) => {
                tracing::info!(
                    session = %session.id,
                    scenario = %reference,
                    "restored session keeps its history"
                );
            }
            Some(session) => {
                session.reset(&config, Some(reference.clone()));
                tracing::info!(
                    session = %session.id,
                    scenario = %config.name,
                    "session re-seeded from scenario"
                );
            }
            None => {
                self.store.create(&config, Some(reference.clone()));
            }
        }
        self.scenario = config;
        self.scenario_ref = Some(reference);
        self.persist().await
    }

    /// Append a synthetic event (e.g. a dice roll) to the current session.
    pub async fn append_event(&mut self, content: &str) -> Result<()> {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let id = self.ensure_session();
        if let Some(session) = self.store.get_mut(&id) {
            session.push(Message::system_event(content));
        }
        self.persist().await
    }

    /// When the active scenario has none of its extension fields, re-read its
    /// source and fill them in for this and later turns.
    async fn refresh_scenario_extensions(&mut self) {
        if self.scenario.has_extensions() {
            return;
        }
        let Some(reference) = self.scenario_ref.clone() else {
            return;
        };
        match self.scenarios.load(&reference).await {
            Ok(refreshed) => self.scenario = self.scenario.merge(&refreshed),
            Err(e) => tracing::warn!(scenario = %reference, error = %e, "scenario refresh failed"),
        }
    }

    // ========== Turns ==========

    /// Run one turn for `input` against the current session (created on
    /// first use). Each streamed chunk is handed to `on_chunk` as it
    /// arrives.
    ///
    /// On completion failure or cancellation the error is returned, the user
    /// message and any compaction stay persisted, and partial reply text is
    /// discarded.
    pub async fn run_turn<F>(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<TurnReport>
    where
        F: FnMut(&str) + Send,
    {
        if !self.hydrated {
            return Err(GmError::NotHydrated);
        }
        let session_id = self.ensure_session();

        self.with_session(&session_id, |s| s.push(Message::user(input)))?;
        self.phase = TurnPhase::UserAppended;
        self.persist().await?;

        self.phase = TurnPhase::Compacting;
        let (log, summary) = self.with_session(&session_id, |s| {
            (s.messages.clone(), s.long_term_memory.clone())
        })?;
        let compaction = self
            .compactor
            .compact(
                &log,
                &summary,
                self.scenario.history_message_count,
                &self.scenario.model,
                self.summarizer.as_ref(),
            )
            .await;
        if compaction.changed() {
            let messages = compaction.kept_messages.clone();
            let summary = compaction.updated_summary.clone();
            self.with_session(&session_id, |s| s.apply_compaction(messages, summary))?;
            self.persist().await?;
        }

        self.phase = TurnPhase::Assembling;
        self.refresh_scenario_extensions().await;
        let payload = {
            let session = self
                .store
                .get(&session_id)
                .ok_or_else(|| GmError::SessionNotFound { id: session_id.clone() })?;
            PromptAssembler::assemble(&session.messages, &session.long_term_memory, &self.scenario)
        };
        let request = CompletionRequest::for_scenario(&self.scenario, payload);

        self.phase = TurnPhase::Streaming;
        tracing::info!(
            session = %session_id,
            segments = request.messages.len(),
            model = %request.model,
            "streaming turn"
        );
        let reply = match self.stream_reply(request, cancel, &mut on_chunk).await {
            Ok(reply) => reply,
            Err(e) => {
                self.phase = TurnPhase::Failed;
                tracing::warn!(session = %session_id, error = %e, "turn failed");
                return Err(e);
            }
        };

        self.with_session(&session_id, |s| s.push(Message::assistant(reply.clone())))?;
        self.persist().await?;
        self.phase = TurnPhase::Completed;

        Ok(TurnReport {
            session_id,
            reply,
            compaction: compaction.outcome,
            compressed_count: compaction.compressed_count,
        })
    }

    async fn stream_reply<F>(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GmError::Cancelled),
            started = self.completion.complete(request) => {
                started.map_err(|e| GmError::Completion(format!("{e:#}")))?
            }
        };

        let mut reply = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        discarded = reply.len(),
                        "turn aborted, discarding partial reply"
                    );
                    return Err(GmError::Cancelled);
                }
                item = stream.next() => match item {
                    Some(Ok(chunk)) => {
                        on_chunk(&chunk);
                        reply.push_str(&chunk);
                    }
                    Some(Err(e)) => return Err(GmError::Completion(format!("{e:#}"))),
                    None => break,
                },
            }
        }

        if reply.trim().is_empty() {
            return Err(GmError::Completion("model returned an empty reply".into()));
        }
        Ok(reply)
    }

    fn with_session<T>(&mut self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        self.store
            .get_mut(id)
            .map(f)
            .ok_or_else(|| GmError::SessionNotFound { id: id.to_string() })
    }
}

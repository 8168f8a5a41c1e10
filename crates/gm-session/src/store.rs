//! The collection of sessions plus which one is current.

use crate::session::Session;
use chrono::{DateTime, Utc};
use gm_core::{GmError, Result, ScenarioConfig};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Listing entry for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub last_touched: DateTime<Utc>,
    pub message_count: usize,
    pub scenario_ref: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStore {
    pub(crate) sessions: HashMap<String, Session>,
    pub(crate) current: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session seeded from `scenario` and make it current.
    pub fn create(
        &mut self,
        scenario: &ScenarioConfig,
        scenario_ref: Option<String>,
    ) -> &mut Session {
        let session = Session::new(scenario, scenario_ref);
        tracing::info!(session = %session.id, scenario = %scenario.name, "created session");
        self.insert(session, true)
    }

    pub fn insert(&mut self, session: Session, make_current: bool) -> &mut Session {
        let id = session.id.clone();
        if make_current || self.current.is_none() {
            self.current = Some(id.clone());
        }
        match self.sessions.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(session);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(session),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_deref().and_then(|id| self.sessions.get(id))
    }

    pub fn current_mut(&mut self) -> Option<&mut Session> {
        let id = self.current.as_deref()?;
        self.sessions.get_mut(id)
    }

    pub fn switch(&mut self, id: &str) -> Result<&Session> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| GmError::SessionNotFound { id: id.to_string() })?;
        self.current = Some(id.to_string());
        Ok(session)
    }

    /// Remove a session. Deleting the current one moves "current" to the
    /// most recently touched survivor, if any.
    pub fn delete(&mut self, id: &str) -> Result<Session> {
        let removed = self
            .sessions
            .remove(id)
            .ok_or_else(|| GmError::SessionNotFound { id: id.to_string() })?;
        if self.current.as_deref() == Some(id) {
            self.current = self
                .sessions
                .values()
                .max_by_key(|s| s.last_touched)
                .map(|s| s.id.clone());
        }
        tracing::info!(session = %id, "deleted session");
        Ok(removed)
    }

    /// Sessions, most recently touched first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> = self
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                last_touched: s.last_touched,
                message_count: s.message_count(),
                scenario_ref: s.scenario_ref.clone(),
                is_current: self.current.as_deref() == Some(s.id.as_str()),
            })
            .collect();
        list.sort_by(|a, b| b.last_touched.cmp(&a.last_touched).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

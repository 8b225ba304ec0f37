//! External collaborator seams used by the orchestrator.
//!
//! All calls are blocking from the core's point of view. Implementations that
//! talk to the network own their own timeouts.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::availability::CalendarEvent;
use crate::error::SessionError;
use crate::plan::SchedulingPlanItem;
use crate::state::ExecutionState;

pub trait CalendarReader: Send + Sync {
    fn list_events(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>>;
}

pub trait CalendarWriter: Send + Sync {
    /// Returns the id of the created event.
    fn create_event(&self, user_id: &str, item: &SchedulingPlanItem) -> Result<String>;
}

/// Where sessions wait for feedback.
pub trait SessionStore: Send + Sync {
    fn save(&self, state: &ExecutionState) -> Result<(), SessionError>;
    fn load(&self, session_id: &str) -> Result<Option<ExecutionState>, SessionError>;
    fn remove(&self, session_id: &str) -> Result<(), SessionError>;
    fn list(&self) -> Result<Vec<String>, SessionError>;

    /// Take a parked session for resumption: it must be awaiting input, and
    /// is saved as no longer awaiting before it is returned, so a second
    /// claim fails with `NotAwaitingInput`. Stores shared between threads or
    /// processes should override this to make the check and the write atomic.
    fn claim(&self, session_id: &str) -> Result<ExecutionState, SessionError> {
        let mut state = self
            .load(session_id)?
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        mark_claimed(&mut state)?;
        self.save(&state)?;
        Ok(state)
    }
}

/// Shared check for `SessionStore::claim` implementations.
pub fn mark_claimed(state: &mut ExecutionState) -> Result<(), SessionError> {
    if !state.awaiting_user_input {
        return Err(SessionError::NotAwaitingInput(state.session_id.clone()));
    }
    state.awaiting_user_input = false;
    Ok(())
}

impl<T: CalendarReader + ?Sized> CalendarReader for Box<T> {
    fn list_events(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>> {
        (**self).list_events(user_id, start, end)
    }
}

impl<T: CalendarWriter + ?Sized> CalendarWriter for Box<T> {
    fn create_event(&self, user_id: &str, item: &SchedulingPlanItem) -> Result<String> {
        (**self).create_event(user_id, item)
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Box<T> {
    fn save(&self, state: &ExecutionState) -> Result<(), SessionError> {
        (**self).save(state)
    }
    fn load(&self, session_id: &str) -> Result<Option<ExecutionState>, SessionError> {
        (**self).load(session_id)
    }
    fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        (**self).remove(session_id)
    }
    fn list(&self) -> Result<Vec<String>, SessionError> {
        (**self).list()
    }
    fn claim(&self, session_id: &str) -> Result<ExecutionState, SessionError> {
        (**self).claim(session_id)
    }
}

/// A fixed list of events, filtered to the requested window.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    pub events: Vec<CalendarEvent>,
}

impl StaticCalendar {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self { events }
    }
}

impl CalendarReader for StaticCalendar {
    fn list_events(
        &self,
        _user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.overlaps(start, end))
            .cloned()
            .collect())
    }
}

/// Writes nothing; returns synthetic ids. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunWriter;

impl CalendarWriter for DryRunWriter {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> Result<String> {
        Ok(format!("dry-run:{}", item.task_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ExecutionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, ExecutionState>>, SessionError> {
        self.sessions
            .lock()
            .map_err(|_| SessionError::Store("session store lock poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&self, state: &ExecutionState) -> Result<(), SessionError> {
        self.guard()?.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ExecutionState>, SessionError> {
        Ok(self.guard()?.get(session_id).cloned())
    }

    fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        self.guard()?.remove(session_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut ids: Vec<String> = self.guard()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn claim(&self, session_id: &str) -> Result<ExecutionState, SessionError> {
        let mut sessions = self.guard()?;
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        mark_claimed(state)?;
        Ok(state.clone())
    }
}

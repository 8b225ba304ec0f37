//! Per-session execution state and the result handed back to callers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::availability::{AvailabilityMatrix, CalendarEvent};
use crate::feedback::Feedback;
use crate::plan::{Conflict, SchedulingPlanItem};
use crate::preferences::Preferences;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorPhase {
    Decompose,
    Schedule,
    AskUser,
    Integrate,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Every task placed (calendar write errors may still be listed).
    FullyScheduled,
    /// Conflicts remain; the session is parked until feedback arrives.
    NeedsInput,
    Failed,
}

/// Everything one session knows. Owned by a single orchestrator call at a
/// time; parked sessions are serialized into a `SessionStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub session_id: String,
    pub user_id: String,
    pub raw_input: String,
    pub tasks: Vec<Task>,
    pub preferences: Preferences,
    /// Event snapshot read once at session start. Availability is rebuilt
    /// from it on every scheduling pass.
    pub calendar: Vec<CalendarEvent>,
    #[serde(default)]
    pub availability: Option<AvailabilityMatrix>,
    pub plan: Vec<SchedulingPlanItem>,
    pub conflicts: Vec<Conflict>,
    pub retry_count: u32,
    /// Set when conflicts remain after `max_retries` automatic passes.
    #[serde(default)]
    pub retries_exhausted: bool,
    pub awaiting_user_input: bool,
    pub errors: Vec<String>,
    pub phase: OrchestratorPhase,
    #[serde(default)]
    pub outcome: Option<SessionOutcome>,
    /// Ids returned by the calendar writer.
    #[serde(default)]
    pub created_events: Vec<String>,
    #[serde(default)]
    pub feedback_log: Vec<Feedback>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ExecutionState {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        raw_input: impl Into<String>,
        preferences: Preferences,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            raw_input: raw_input.into(),
            tasks: Vec::new(),
            preferences,
            calendar: Vec::new(),
            availability: None,
            plan: Vec::new(),
            conflicts: Vec::new(),
            retry_count: 0,
            retries_exhausted: false,
            awaiting_user_input: false,
            errors: Vec::new(),
            phase: OrchestratorPhase::Decompose,
            outcome: None,
            created_events: Vec::new(),
            feedback_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scheduled_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Scheduled)
            .count()
    }
}

/// Terminal view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub plan: Vec<SchedulingPlanItem>,
    pub conflicts: Vec<Conflict>,
    pub awaiting_user_input: bool,
    pub errors: Vec<String>,
    pub retry_count: u32,
}

impl From<&ExecutionState> for SessionResult {
    fn from(state: &ExecutionState) -> Self {
        let outcome = state.outcome.unwrap_or(if state.awaiting_user_input {
            SessionOutcome::NeedsInput
        } else if state.conflicts.is_empty() && !state.tasks.is_empty() {
            SessionOutcome::FullyScheduled
        } else {
            SessionOutcome::Failed
        });
        Self {
            session_id: state.session_id.clone(),
            outcome,
            plan: state.plan.clone(),
            conflicts: state.conflicts.clone(),
            awaiting_user_input: state.awaiting_user_input,
            errors: state.errors.clone(),
            retry_count: state.retry_count,
        }
    }
}

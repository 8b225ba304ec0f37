//! Orchestrator: drives one scheduling session through
//! decompose -> schedule -> (ask_user | integrate) -> done.
//!
//! The orchestrator owns no per-session data. Each call builds or loads an
//! `ExecutionState`, advances it to `done`, persists it, and returns a
//! `SessionResult`. Independent sessions may run on separate threads.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

use crate::availability::build_availability;
use crate::collaborators::{CalendarReader, CalendarWriter, InMemorySessionStore, SessionStore};
use crate::decompose::Decomposer;
use crate::error::SessionError;
use crate::feedback::{Feedback, FeedbackPrompt, FeedbackSource};
use crate::oracle::DecisionOracle;
use crate::planner::SchedulingPlanner;
use crate::preferences::Preferences;
use crate::state::{ExecutionState, OrchestratorPhase, SessionOutcome, SessionResult};
use crate::task::TaskStatus;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Automatic ask_user -> schedule loops allowed per session.
    pub max_retries: u32,
    /// Wall-clock budget for one run_session/submit_feedback call.
    pub session_timeout: Option<std::time::Duration>,
    /// Pin "now" (local time). `None` uses the system clock.
    pub fixed_now: Option<NaiveDateTime>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            session_timeout: Some(std::time::Duration::from_secs(120)),
            fixed_now: None,
        }
    }
}

pub struct Orchestrator<D, R, W, O> {
    decomposer: D,
    reader: R,
    writer: W,
    oracle: O,
    feedback: Option<Box<dyn FeedbackSource>>,
    store: Box<dyn SessionStore>,
    config: OrchestratorConfig,
}

impl<D, R, W, O> Orchestrator<D, R, W, O>
where
    D: Decomposer,
    R: CalendarReader,
    W: CalendarWriter,
    O: DecisionOracle,
{
    pub fn new(decomposer: D, reader: R, writer: W, oracle: O) -> Self {
        Self {
            decomposer,
            reader,
            writer,
            oracle,
            feedback: None,
            store: Box::new(InMemorySessionStore::new()),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_feedback_source(mut self, source: impl FeedbackSource + 'static) -> Self {
        self.feedback = Some(Box::new(source));
        self
    }

    pub fn with_session_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn session_store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn load_session(&self, session_id: &str) -> Result<ExecutionState, SessionError> {
        self.store
            .load(session_id)?
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    /// Run a new session from raw user input to `done`.
    pub fn run_session(
        &self,
        user_id: &str,
        raw_input: &str,
        preferences: Preferences,
    ) -> SessionResult {
        let session_id = Uuid::new_v4().to_string();
        let mut state = ExecutionState::new(&session_id, user_id, raw_input, preferences, self.now());
        tracing::info!(session = %session_id, user = %user_id, "session started");

        if let Err(e) = state.preferences.validate() {
            self.fail(&mut state, format!("invalid preferences: {e}"));
        }
        let deadline = self.deadline();
        self.drive(&mut state, deadline);
        SessionResult::from(&state)
    }

    /// Resume a parked session with user feedback.
    pub fn submit_feedback(
        &self,
        session_id: &str,
        feedback: Feedback,
    ) -> Result<SessionResult, SessionError> {
        let mut state = self.store.claim(session_id)?;
        tracing::info!(session = %session_id, "feedback received; resuming");

        state.retries_exhausted = false;
        self.apply_feedback(&mut state, feedback);
        state.phase = OrchestratorPhase::Schedule;
        let deadline = self.deadline();
        self.drive(&mut state, deadline);
        Ok(SessionResult::from(&state))
    }

    fn now(&self) -> NaiveDateTime {
        self.config
            .fixed_now
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.session_timeout.map(|t| Instant::now() + t)
    }

    fn drive(&self, state: &mut ExecutionState, deadline: Option<Instant>) {
        while state.phase != OrchestratorPhase::Done {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.fail(
                    state,
                    format!("session timed out during {:?}", state.phase).to_lowercase(),
                );
                break;
            }
            let from = state.phase;
            state.phase = match from {
                OrchestratorPhase::Decompose => self.decompose(state),
                OrchestratorPhase::Schedule => self.schedule(state, deadline),
                OrchestratorPhase::AskUser => self.ask_user(state),
                OrchestratorPhase::Integrate => self.integrate(state),
                OrchestratorPhase::Done => OrchestratorPhase::Done,
            };
            state.updated_at = self.now();
            tracing::debug!(session = %state.session_id, ?from, to = ?state.phase, "transition");
        }
        self.finish(state);
    }

    fn decompose(&self, state: &mut ExecutionState) -> OrchestratorPhase {
        let tasks = match self.decomposer.decompose(&state.raw_input) {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(session = %state.session_id, error = %e, "decomposition failed");
                return self.fail(state, format!("decomposition failed: {e:#}"));
            }
        };
        if tasks.is_empty() {
            return self.fail(state, "decomposition produced no tasks".to_string());
        }
        let mut seen = HashSet::new();
        for t in &tasks {
            if let Err(e) = t.validate() {
                return self.fail(state, format!("decomposition produced an invalid task: {e}"));
            }
            if !seen.insert(t.id.as_str()) {
                return self.fail(state, format!("decomposition produced duplicate task id '{}'", t.id));
            }
        }
        tracing::info!(session = %state.session_id, tasks = tasks.len(), "decomposed input");
        state.tasks = tasks;

        if let Err(e) = self.refresh_calendar(state) {
            tracing::warn!(session = %state.session_id, error = %e, "calendar read failed");
            return self.fail(state, format!("calendar read failed: {e:#}"));
        }
        OrchestratorPhase::Schedule
    }

    fn refresh_calendar(&self, state: &mut ExecutionState) -> anyhow::Result<()> {
        let start = self.now().date().and_time(NaiveTime::MIN);
        let end = start + Duration::days(i64::from(state.preferences.horizon_days));
        state.calendar = self.reader.list_events(&state.user_id, start, end)?;
        Ok(())
    }

    fn schedule(&self, state: &mut ExecutionState, deadline: Option<Instant>) -> OrchestratorPhase {
        let now = self.now();
        let mut matrix = match build_availability(
            &state.calendar,
            &state.preferences,
            now.date(),
            state.preferences.horizon_days,
        ) {
            Ok(m) => m,
            Err(e) => return self.fail(state, format!("availability: {e}")),
        };
        matrix.block_before(now);

        for t in state.tasks.iter_mut() {
            t.status = TaskStatus::Unscheduled;
        }
        state.plan.clear();
        state.conflicts.clear();

        let mut planner = SchedulingPlanner::new(&state.preferences, &self.oracle, &state.calendar);
        if let Some(d) = deadline {
            planner = planner.with_deadline(d);
        }
        let output = match planner.run(state.tasks.clone(), &mut matrix) {
            Ok(out) => out,
            Err(e) => return self.fail(state, format!("planner: {e}")),
        };
        planner.finish();

        state.tasks = output.tasks;
        state.plan = output.plan;
        state.conflicts = output.conflicts;
        state.availability = Some(matrix);

        if output.truncated {
            let left = state
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Unscheduled)
                .count();
            return self.fail(
                state,
                format!("session timed out while scheduling; {left} task(s) left unscheduled"),
            );
        }

        tracing::info!(
            session = %state.session_id,
            placed = state.plan.len(),
            conflicts = state.conflicts.len(),
            retry = state.retry_count,
            "scheduling pass complete"
        );

        if state.conflicts.is_empty() {
            return OrchestratorPhase::Integrate;
        }
        if state.retry_count >= self.config.max_retries {
            state.retries_exhausted = true;
        } else {
            state.retry_count += 1;
        }
        OrchestratorPhase::AskUser
    }

    fn ask_user(&self, state: &mut ExecutionState) -> OrchestratorPhase {
        let source = self.feedback.as_ref().filter(|_| !state.retries_exhausted);
        if let Some(source) = source {
            let prompt = FeedbackPrompt {
                session_id: &state.session_id,
                tasks: &state.tasks,
                conflicts: &state.conflicts,
                retry_count: state.retry_count,
                max_retries: self.config.max_retries,
            };
            if let Some(fb) = source.request_feedback(&prompt) {
                self.apply_feedback(state, fb);
                return OrchestratorPhase::Schedule;
            }
        }

        if state.retries_exhausted {
            tracing::info!(
                session = %state.session_id,
                retries = state.retry_count,
                "retries exhausted; waiting for user input"
            );
        }
        state.awaiting_user_input = true;
        state.outcome = Some(SessionOutcome::NeedsInput);
        OrchestratorPhase::Done
    }

    fn apply_feedback(&self, state: &mut ExecutionState, feedback: Feedback) {
        let horizon_before = state.preferences.horizon_days;
        let errors = feedback.merge_into(&mut state.tasks, &mut state.preferences);
        for e in &errors {
            tracing::warn!(session = %state.session_id, "{e}");
        }
        state.errors.extend(errors);
        state.feedback_log.push(feedback);
        state.awaiting_user_input = false;
        state.outcome = None;

        if state.preferences.horizon_days > horizon_before {
            if let Err(e) = self.refresh_calendar(state) {
                tracing::warn!(session = %state.session_id, error = %e, "calendar re-read failed");
                state.errors.push(format!(
                    "calendar re-read failed; keeping the earlier snapshot: {e:#}"
                ));
            }
        }
    }

    fn integrate(&self, state: &mut ExecutionState) -> OrchestratorPhase {
        for item in &state.plan {
            match self.writer.create_event(&state.user_id, item) {
                Ok(id) => state.created_events.push(id),
                Err(e) => {
                    tracing::warn!(session = %state.session_id, task = %item.task_id, error = %e, "calendar write failed");
                    state
                        .errors
                        .push(format!("calendar write failed for '{}': {e:#}", item.task_id));
                }
            }
        }
        state.outcome = Some(SessionOutcome::FullyScheduled);
        OrchestratorPhase::Done
    }

    fn fail(&self, state: &mut ExecutionState, error: String) -> OrchestratorPhase {
        state.errors.push(error);
        state.outcome = Some(SessionOutcome::Failed);
        state.awaiting_user_input = false;
        state.phase = OrchestratorPhase::Done;
        OrchestratorPhase::Done
    }

    fn finish(&self, state: &mut ExecutionState) {
        state.phase = OrchestratorPhase::Done;
        state.updated_at = self.now();
        let outcome = SessionResult::from(&*state).outcome;
        tracing::info!(
            session = %state.session_id,
            ?outcome,
            tasks = state.tasks.len(),
            placed = state.scheduled_count(),
            conflicts = state.conflicts.len(),
            errors = state.errors.len(),
            retries = state.retry_count,
            "session done"
        );
        if let Err(e) = self.store.save(state) {
            tracing::warn!(session = %state.session_id, error = %e, "failed to persist session");
            state.errors.push(format!("failed to persist session: {e}"));
        }
    }
}

//! Scheduling Planner: places tasks one at a time in priority order and
//! records what could not be placed.
//!
//! Invariant: every placement consumes its slots before the next task is
//! considered, so plan items never overlap. The planner does not retry; the
//! orchestrator decides what happens after a conflicted run.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::availability::{AvailabilityMatrix, CalendarEvent};
use crate::constraints::ConstraintSet;
use crate::error::{AvailabilityError, PlannerError};
use crate::oracle::DecisionOracle;
use crate::plan::{verify_no_overlap, Conflict, ConflictReason, SchedulingPlanItem};
use crate::preferences::Preferences;
use crate::selector::{candidate_windows, select_slot};
use crate::task::{sort_for_scheduling, Task, TaskStatus};
use crate::time::fmt_clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerState {
    Pending,
    Scheduling,
    Conflicted,
    Scheduled,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOutput {
    /// Tasks in scheduling order, with their final status.
    pub tasks: Vec<Task>,
    pub plan: Vec<SchedulingPlanItem>,
    pub conflicts: Vec<Conflict>,
    pub state: PlannerState,
    /// The session deadline passed before every task was considered.
    pub truncated: bool,
}

pub struct SchedulingPlanner<'a> {
    preferences: &'a Preferences,
    oracle: &'a dyn DecisionOracle,
    calendar: &'a [CalendarEvent],
    deadline: Option<Instant>,
    state: PlannerState,
}

impl<'a> SchedulingPlanner<'a> {
    pub fn new(
        preferences: &'a Preferences,
        oracle: &'a dyn DecisionOracle,
        calendar: &'a [CalendarEvent],
    ) -> Self {
        Self {
            preferences,
            oracle,
            calendar,
            deadline: None,
            state: PlannerState::Pending,
        }
    }

    /// Stop placing further tasks once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Terminal transition. Only the orchestrator calls this.
    pub fn finish(&mut self) {
        self.state = PlannerState::Done;
    }

    /// Place `tasks` into `availability`, consuming slots as it goes.
    ///
    /// Errors only on invariant violations (bad task data, overlapping
    /// output). Unplaceable tasks become conflicts.
    pub fn run(
        &mut self,
        tasks: Vec<Task>,
        availability: &mut AvailabilityMatrix,
    ) -> Result<PlannerOutput, PlannerError> {
        self.state = PlannerState::Pending;
        self.preferences
            .validate()
            .map_err(AvailabilityError::InvalidPreferences)?;
        availability.validate()?;
        let mut tasks = validate_tasks(tasks)?;
        sort_for_scheduling(&mut tasks);

        self.state = PlannerState::Scheduling;
        let mut plan: Vec<SchedulingPlanItem> = Vec::new();
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut truncated = false;

        for task in tasks.iter_mut() {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                truncated = true;
                tracing::warn!(task = %task.id, "session deadline reached; leaving remaining tasks unscheduled");
                break;
            }

            let choice = select_slot(task, availability, &plan, self.preferences, self.oracle);
            match choice.slot {
                Some(slot) => {
                    let buffer = Duration::minutes(self.preferences.break_minutes);
                    availability.occupy(slot.start, slot.end + buffer);
                    task.status = TaskStatus::Scheduled;
                    tracing::info!(
                        task = %task.id,
                        start = %slot.start,
                        end = %slot.end,
                        via_oracle = choice.via_oracle,
                        "placed task"
                    );
                    plan.push(SchedulingPlanItem {
                        task_id: task.id.clone(),
                        title: task.title.clone(),
                        start: slot.start,
                        end: slot.end,
                        location: task.location.clone(),
                        category: task.category.clone(),
                        rationale: choice.rationale,
                        score: choice.score,
                    });
                }
                None => {
                    task.status = TaskStatus::Conflicted;
                    let mut conflict =
                        classify_conflict(task, availability, self.preferences, self.calendar);
                    conflict.rationale = Some(choice.rationale);
                    tracing::info!(task = %task.id, reason = %conflict.reason, "task conflicted");
                    conflicts.push(conflict);
                }
            }
        }

        verify_no_overlap(&plan)?;

        self.state = if conflicts.is_empty() {
            PlannerState::Scheduled
        } else {
            PlannerState::Conflicted
        };

        Ok(PlannerOutput {
            tasks,
            plan,
            conflicts,
            state: self.state,
            truncated,
        })
    }
}

fn validate_tasks(tasks: Vec<Task>) -> Result<Vec<Task>, PlannerError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tasks.len());
    for mut t in tasks {
        t.validate().map_err(PlannerError::InvalidTask)?;
        if !seen.insert(t.id.clone()) {
            return Err(PlannerError::DuplicateTaskId(t.id));
        }
        t.status = TaskStatus::Unscheduled;
        out.push(t);
    }
    Ok(out)
}

/// Work out why `task` has no slot, against the current (partially
/// consumed) availability and the raw calendar.
pub fn classify_conflict(
    task: &Task,
    availability: &AvailabilityMatrix,
    preferences: &Preferences,
    calendar: &[CalendarEvent],
) -> Conflict {
    let horizon_start = availability.span().map(|(s, _)| s);

    if let Some(dl) = task.deadline {
        let before_horizon = horizon_start.is_some_and(|s| dl <= s);
        let without_deadline = candidate_windows(task, availability, preferences, false);
        if before_horizon || !without_deadline.is_empty() {
            let suggestion = match without_deadline.first() {
                Some(first) => format!(
                    "Deadline {} cannot be met; the earliest fitting slot starts {}. Extend the deadline or free time earlier.",
                    fmt_ts(dl),
                    fmt_ts(first.start)
                ),
                None => format!(
                    "Deadline {} is already past or before the planning horizon.",
                    fmt_ts(dl)
                ),
            };
            return Conflict::new(&task.id, ConflictReason::DeadlineUnreachable, suggestion);
        }
    }

    let constraints = ConstraintSet::parse(&task.constraints);
    if let Some(exact) = constraints.exact_start() {
        let duration = Duration::minutes(task.duration_minutes);
        let today = availability.first_day();
        let windows: Vec<(NaiveDateTime, NaiveDateTime)> = availability
            .days()
            .filter(|(d, _)| today.is_some_and(|t| constraints.allows_day(**d, t)))
            .map(|(d, _)| {
                let s = d.and_time(exact);
                (s, s + duration)
            })
            .collect();

        let hits = |movable: bool| -> Vec<String> {
            let mut names: Vec<String> = calendar
                .iter()
                .filter(|e| e.is_movable == movable)
                .filter(|e| windows.iter().any(|(s, en)| e.overlaps(*s, *en)))
                .map(|e| e.summary.clone())
                .collect();
            let mut seen = HashSet::new();
            names.retain(|n| seen.insert(n.clone()));
            names
        };

        let immovable = hits(false);
        if !immovable.is_empty() {
            let mut c = Conflict::new(
                &task.id,
                ConflictReason::ImmovableOverlap,
                format!(
                    "{} at {} overlaps {} which cannot be moved; choose another time.",
                    task.title,
                    fmt_clock(exact),
                    quote_list(&immovable)
                ),
            );
            c.blocking_events = immovable;
            return c;
        }

        let movable = hits(true);
        if !movable.is_empty() {
            let mut c = Conflict::new(
                &task.id,
                ConflictReason::NoAvailableSlot,
                format!(
                    "Moving {} would free {} for {}.",
                    quote_list(&movable),
                    fmt_clock(exact),
                    task.title
                ),
            );
            c.blocking_events = movable;
            return c;
        }

        return Conflict::new(
            &task.id,
            ConflictReason::NoAvailableSlot,
            format!(
                "{} is already taken or outside work hours; try a different time.",
                fmt_clock(exact)
            ),
        );
    }

    let mut parts = Vec::new();
    match availability.longest_free_run() {
        Some((start, minutes)) if minutes < task.duration_minutes => parts.push(format!(
            "The longest free block is {minutes} minutes (from {}); consider shortening or splitting the task.",
            fmt_ts(start)
        )),
        None => parts.push("No free time remains in the planning horizon.".to_string()),
        _ => {}
    }
    if !constraints.is_empty() {
        parts.push(format!(
            "Consider relaxing: {}.",
            task.constraints.join(", ")
        ));
    }
    let movable: Vec<String> = calendar
        .iter()
        .filter(|e| e.is_movable)
        .map(|e| e.summary.clone())
        .collect();
    if !movable.is_empty() {
        parts.push(format!("Movable events: {}.", quote_list(&movable)));
    }
    if parts.is_empty() {
        parts.push(
            "Consider shortening the task, moving other events, or scheduling on another day."
                .to_string(),
        );
    }

    let mut c = Conflict::new(&task.id, ConflictReason::NoAvailableSlot, parts.join(" "));
    c.blocking_events = movable;
    c
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

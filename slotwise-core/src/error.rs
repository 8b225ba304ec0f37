//! Error types for slotwise-core.
//!
//! Business-level scheduling failures are not errors; they are `Conflict`s.
//! What lives here is malformed input and broken invariants.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Availability Engine failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AvailabilityError {
    /// A calendar event whose end is not after its start.
    #[error("invalid calendar event '{summary}': end {end} is not after start {start}")]
    InvalidEvent {
        summary: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("invalid preferences: {0}")]
    InvalidPreferences(String),

    /// The slot grid has a gap or an overlap. Programming error.
    #[error("availability grid broken on {day}: {detail}")]
    BrokenGrid { day: String, detail: String },
}

/// Scheduling Planner failures. Never raised for "could not place".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// Two plan items overlap. Programming error.
    #[error("plan items '{first}' and '{second}' overlap")]
    OverlappingPlan { first: String, second: String },

    #[error(transparent)]
    Availability(#[from] AvailabilityError),
}

/// Session lookup / resume failures exposed through the feedback channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("session {0} is not awaiting user input")]
    NotAwaitingInput(String),

    #[error("session store error: {0}")]
    Store(String),
}

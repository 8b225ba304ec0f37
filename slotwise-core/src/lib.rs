//! slotwise-core: task scheduling and conflict resolution for the slotwise planner

pub mod availability;
pub mod collaborators;
pub mod constraints;
pub mod decompose;
pub mod error;
pub mod feedback;
pub mod oracle;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod preferences;
pub mod selector;
pub mod state;
pub mod task;
pub mod time;

pub use availability::{build_availability, AvailabilityMatrix, CalendarEvent};
pub use collaborators::{
    CalendarReader, CalendarWriter, DryRunWriter, InMemorySessionStore, SessionStore,
    StaticCalendar,
};
pub use constraints::{parse_constraint, ConstraintSet, DayRef, TimeConstraint};
pub use decompose::{parse_task_payload, strip_code_fence, Decomposer, StaticDecomposer};
pub use error::{AvailabilityError, PlannerError, SessionError};
pub use feedback::{Feedback, FeedbackPrompt, FeedbackSource, PreferenceOverrides, TaskAdjustment};
pub use oracle::{
    parse_oracle_reply, request_context, DecisionOracle, HeuristicOracle, OracleChoice,
    OracleRequest, RankedCandidate,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_MAX_RETRIES};
pub use plan::{verify_no_overlap, Conflict, ConflictReason, SchedulingPlanItem};
pub use planner::{PlannerOutput, PlannerState, SchedulingPlanner};
pub use preferences::{Preferences, ScoringWeights, MAX_HORIZON_DAYS};
pub use selector::{select_slot, SlotChoice};
pub use state::{ExecutionState, OrchestratorPhase, SessionOutcome, SessionResult};
pub use task::{EnergyLevel, Task, TaskKind, TaskStatus, MAX_TASK_MINUTES};
pub use time::{TimeOfDay, TimeSlot};

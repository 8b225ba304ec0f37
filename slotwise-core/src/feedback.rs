//! User feedback applied to a conflicted session before the next scheduling
//! pass.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::preferences::Preferences;
use crate::task::{Task, TaskStatus, MAX_TASK_MINUTES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TaskAdjustment {
    Drop { task_id: String },
    SetDuration { task_id: String, minutes: i64 },
    SetPriority { task_id: String, priority: u32 },
    AddConstraint { task_id: String, constraint: String },
    ClearConstraints { task_id: String },
    /// `None` removes the deadline.
    SetDeadline { task_id: String, deadline: Option<NaiveDateTime> },
}

impl TaskAdjustment {
    pub fn task_id(&self) -> &str {
        match self {
            TaskAdjustment::Drop { task_id }
            | TaskAdjustment::SetDuration { task_id, .. }
            | TaskAdjustment::SetPriority { task_id, .. }
            | TaskAdjustment::AddConstraint { task_id, .. }
            | TaskAdjustment::ClearConstraints { task_id }
            | TaskAdjustment::SetDeadline { task_id, .. } => task_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceOverrides {
    pub work_hours_start: Option<NaiveTime>,
    pub work_hours_end: Option<NaiveTime>,
    pub lunch_start: Option<NaiveTime>,
    pub skip_lunch: bool,
    pub horizon_days: Option<u32>,
    pub break_minutes: Option<i64>,
}

impl PreferenceOverrides {
    pub fn is_empty(&self) -> bool {
        *self == PreferenceOverrides::default()
    }

    fn apply(&self, prefs: &Preferences) -> Preferences {
        let mut p = prefs.clone();
        if let Some(t) = self.work_hours_start {
            p.work_hours_start = t;
        }
        if let Some(t) = self.work_hours_end {
            p.work_hours_end = t;
        }
        if self.skip_lunch {
            p.lunch_start = None;
        } else if let Some(t) = self.lunch_start {
            p.lunch_start = Some(t);
        }
        if let Some(d) = self.horizon_days {
            p.horizon_days = d;
        }
        if let Some(b) = self.break_minutes {
            p.break_minutes = b;
        }
        p
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub adjustments: Vec<TaskAdjustment>,
    #[serde(default)]
    pub preferences: PreferenceOverrides,
    #[serde(default)]
    pub note: Option<String>,
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty() && self.preferences.is_empty() && self.note.is_none()
    }

    pub fn adjust(mut self, adjustment: TaskAdjustment) -> Self {
        self.adjustments.push(adjustment);
        self
    }

    /// Apply to the session's tasks and preferences. Adjustments for unknown
    /// tasks and overrides that would produce invalid preferences are skipped
    /// and reported in the returned error list.
    pub fn merge_into(&self, tasks: &mut Vec<Task>, preferences: &mut Preferences) -> Vec<String> {
        let mut errors = Vec::new();

        for adj in &self.adjustments {
            let id = adj.task_id();
            let Some(pos) = tasks.iter().position(|t| t.id == id) else {
                errors.push(format!("feedback refers to unknown task '{id}'"));
                continue;
            };
            match adj {
                TaskAdjustment::Drop { .. } => {
                    tasks.remove(pos);
                    continue;
                }
                TaskAdjustment::SetDuration { minutes, .. } => {
                    if *minutes <= 0 || *minutes > MAX_TASK_MINUTES {
                        errors.push(format!(
                            "duration for '{id}' must be within 1..={MAX_TASK_MINUTES}, got {minutes}"
                        ));
                        continue;
                    }
                    tasks[pos].duration_minutes = *minutes;
                }
                TaskAdjustment::SetPriority { priority, .. } => tasks[pos].priority = *priority,
                TaskAdjustment::AddConstraint { constraint, .. } => {
                    tasks[pos].constraints.push(constraint.trim().to_string())
                }
                TaskAdjustment::ClearConstraints { .. } => tasks[pos].constraints.clear(),
                TaskAdjustment::SetDeadline { deadline, .. } => tasks[pos].deadline = *deadline,
            }
            tasks[pos].status = TaskStatus::Unscheduled;
        }

        if !self.preferences.is_empty() {
            let candidate = self.preferences.apply(preferences);
            match candidate.validate() {
                Ok(()) => *preferences = candidate,
                Err(e) => errors.push(format!("ignoring preference overrides: {e}")),
            }
        }

        errors
    }
}

/// Synchronous feedback provider, e.g. an interactive prompt. Returning
/// `None` parks the session until feedback is submitted later.
pub trait FeedbackSource: Send + Sync {
    fn request_feedback(&self, prompt: &FeedbackPrompt<'_>) -> Option<Feedback>;
}

/// What the user is shown when asked for input.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackPrompt<'a> {
    pub session_id: &'a str,
    pub tasks: &'a [Task],
    pub conflicts: &'a [crate::plan::Conflict],
    pub retry_count: u32,
    pub max_retries: u32,
}

impl<T: FeedbackSource + ?Sized> FeedbackSource for Box<T> {
    fn request_feedback(&self, prompt: &FeedbackPrompt<'_>) -> Option<Feedback> {
        (**self).request_feedback(prompt)
    }
}

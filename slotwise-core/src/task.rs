//! Task model shared by every stage of a scheduling session.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::preferences::MAX_HORIZON_DAYS;

/// Longest task accepted: the full planning horizon.
pub const MAX_TASK_MINUTES: i64 = MAX_HORIZON_DAYS as i64 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Activity,
    Travel,
}

/// Lifecycle flag owned by the scheduling planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Unscheduled,
    Scheduled,
    Conflicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

/// A unit of work to place on the calendar.
///
/// Created once by decomposition; afterwards only `status` changes, and only
/// inside the planner. Feedback merges produce new task values between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub kind: TaskKind,

    /// Minutes. Must be positive.
    pub duration_minutes: i64,

    /// Lower value = higher priority.
    pub priority: u32,

    /// Loose free-text hints: "at 14:00", "after 17:00", "before EOD".
    #[serde(default)]
    pub constraints: Vec<String>,

    #[serde(default)]
    pub deadline: Option<NaiveDateTime>,

    #[serde(default)]
    pub location: Option<String>,

    /// e.g. "work", "exercise". Drives preference alignment and continuity.
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub energy: Option<EnergyLevel>,

    #[serde(default)]
    pub contacts: Vec<String>,

    #[serde(default)]
    pub notes: String,

    /// Decomposer confidence, 0..1.
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default)]
    pub status: TaskStatus,
}

fn default_confidence() -> f64 {
    0.6
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: TaskKind::Activity,
            duration_minutes: 30,
            priority: 2,
            constraints: Vec::new(),
            deadline: None,
            location: None,
            category: None,
            energy: None,
            contacts: Vec::new(),
            notes: String::new(),
            confidence: default_confidence(),
            status: TaskStatus::Unscheduled,
        }
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveDateTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_energy(mut self, energy: EnergyLevel) -> Self {
        self.energy = Some(energy);
        self
    }

    /// Input-level checks. Violations are rejected, never coerced.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must be non-empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err(format!("task {}: title must be non-empty", self.id));
        }
        if self.duration_minutes <= 0 || self.duration_minutes > MAX_TASK_MINUTES {
            return Err(format!(
                "task {}: duration_minutes must be within 1..={MAX_TASK_MINUTES} (got {})",
                self.id, self.duration_minutes
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("task {}: confidence must be within 0..1", self.id));
        }
        Ok(())
    }
}

/// Planner ordering: priority ascending, then deadline ascending with
/// no-deadline tasks last. Stable, so equal keys keep input order.
pub fn sort_for_scheduling(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.priority.cmp(&b.priority).then_with(|| match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn sort_by_priority_then_deadline_nulls_last() {
        let mut tasks = vec![
            Task::new("a", "no deadline").with_priority(1),
            Task::new("b", "late").with_priority(1).with_deadline(at(5, 12)),
            Task::new("c", "low").with_priority(3).with_deadline(at(2, 9)),
            Task::new("d", "early").with_priority(1).with_deadline(at(3, 12)),
        ];
        sort_for_scheduling(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut tasks = vec![
            Task::new("x", "one"),
            Task::new("y", "two"),
            Task::new("z", "three"),
        ];
        sort_for_scheduling(&mut tasks);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn validate_rejects_zero_duration() {
        let t = Task::new("t1", "nothing").with_duration(0);
        let err = t.validate().unwrap_err();
        assert!(err.contains("duration_minutes"));
    }

    #[test]
    fn validate_rejects_duration_beyond_horizon() {
        let t = Task::new("t1", "forever").with_duration(1_000_000_000_000_000);
        assert!(t.validate().unwrap_err().contains("duration_minutes"));
        let t = Task::new("t2", "long").with_duration(MAX_TASK_MINUTES);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn serde_defaults_fill_optional_fields() {
        let t: Task = serde_json::from_str(
            r#"{"id":"t1","title":"Gym","duration_minutes":60,"priority":5}"#,
        )
        .unwrap();
        assert_eq!(t.kind, TaskKind::Activity);
        assert_eq!(t.status, TaskStatus::Unscheduled);
        assert!(t.constraints.is_empty());
        assert!((t.confidence - 0.6).abs() < f64::EPSILON);
    }
}

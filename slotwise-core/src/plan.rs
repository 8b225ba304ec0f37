//! Plan items and conflicts produced by the scheduling planner.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;
use crate::time::overlaps;

/// A task bound to a concrete `[start, end)` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingPlanItem {
    pub task_id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: Option<String>,
    pub category: Option<String>,
    /// Why this slot was chosen (oracle or heuristic).
    pub rationale: String,
    pub score: f64,
}

impl SchedulingPlanItem {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NoAvailableSlot,
    DeadlineUnreachable,
    ImmovableOverlap,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictReason::NoAvailableSlot => "no_available_slot",
            ConflictReason::DeadlineUnreachable => "deadline_unreachable",
            ConflictReason::ImmovableOverlap => "immovable_overlap",
        };
        f.write_str(s)
    }
}

/// A task that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub task_id: String,
    pub reason: ConflictReason,
    pub suggestion: String,
    #[serde(default)]
    pub rationale: Option<String>,
    /// Summaries of calendar events involved in the conflict.
    #[serde(default)]
    pub blocking_events: Vec<String>,
}

impl Conflict {
    pub fn new(task_id: impl Into<String>, reason: ConflictReason, suggestion: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            reason,
            suggestion: suggestion.into(),
            rationale: None,
            blocking_events: Vec::new(),
        }
    }
}

/// No two items may overlap. Checked after every planner run.
pub fn verify_no_overlap(plan: &[SchedulingPlanItem]) -> Result<(), PlannerError> {
    let mut sorted: Vec<&SchedulingPlanItem> = plan.iter().collect();
    sorted.sort_by_key(|i| (i.start, i.end));
    for pair in sorted.windows(2) {
        if overlaps(pair[0].start, pair[0].end, pair[1].start, pair[1].end) {
            return Err(PlannerError::OverlappingPlan {
                first: pair[0].task_id.clone(),
                second: pair[1].task_id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(id: &str, sh: u32, eh: u32) -> SchedulingPlanItem {
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        SchedulingPlanItem {
            task_id: id.to_string(),
            title: id.to_string(),
            start: d.and_hms_opt(sh, 0, 0).unwrap(),
            end: d.and_hms_opt(eh, 0, 0).unwrap(),
            location: None,
            category: None,
            rationale: String::new(),
            score: 0.0,
        }
    }

    #[test]
    fn back_to_back_items_do_not_overlap() {
        verify_no_overlap(&[item("b", 10, 11), item("a", 9, 10)]).unwrap();
    }

    #[test]
    fn overlapping_items_are_fatal() {
        let err = verify_no_overlap(&[item("a", 9, 11), item("b", 10, 12)]).unwrap_err();
        assert_eq!(
            err,
            PlannerError::OverlappingPlan {
                first: "a".to_string(),
                second: "b".to_string()
            }
        );
    }

    #[test]
    fn conflict_reason_serializes_snake_case() {
        let c = Conflict::new("t1", ConflictReason::NoAvailableSlot, "shorten it");
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"reason\":\"no_available_slot\""));
    }
}

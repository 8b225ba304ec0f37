//! User preferences and scoring weights.
//!
//! Passed explicitly into every component; nothing in the core reads ambient
//! configuration.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::time::TimeOfDay;

/// Longest planning window accepted, in days.
pub const MAX_HORIZON_DAYS: u32 = 366;

const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub work_hours_start: NaiveTime,
    pub work_hours_end: NaiveTime,
    /// `None` disables the lunch block.
    pub lunch_start: Option<NaiveTime>,
    pub lunch_duration_minutes: i64,
    /// Buffer kept free after every placed task.
    pub break_minutes: i64,
    pub slot_granularity_minutes: i64,
    pub horizon_days: u32,
    pub most_productive_time: Option<TimeOfDay>,
    /// Preferred time of day per task category, e.g. exercise -> evening.
    pub category_times: BTreeMap<String, TimeOfDay>,
    pub weights: ScoringWeights,
}

impl Default for Preferences {
    fn default() -> Self {
        let mut category_times = BTreeMap::new();
        category_times.insert("exercise".to_string(), TimeOfDay::Evening);
        Self {
            work_hours_start: clock(9, 0),
            work_hours_end: clock(18, 0),
            lunch_start: Some(clock(13, 0)),
            lunch_duration_minutes: 60,
            break_minutes: 0,
            slot_granularity_minutes: 15,
            horizon_days: 7,
            most_productive_time: None,
            category_times,
            weights: ScoringWeights::default(),
        }
    }
}

impl Preferences {
    pub fn with_work_hours(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.work_hours_start = start;
        self.work_hours_end = end;
        self
    }

    pub fn without_lunch(mut self) -> Self {
        self.lunch_start = None;
        self
    }

    pub fn with_horizon_days(mut self, days: u32) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.work_hours_start >= self.work_hours_end {
            return Err(format!(
                "work_hours_start ({}) must be before work_hours_end ({})",
                self.work_hours_start, self.work_hours_end
            ));
        }
        let g = self.slot_granularity_minutes;
        if g <= 0 || 1440 % g != 0 {
            return Err(format!(
                "slot_granularity_minutes must divide a day (got {g})"
            ));
        }
        if self.horizon_days == 0 || self.horizon_days > MAX_HORIZON_DAYS {
            return Err(format!(
                "horizon_days must be within 1..={MAX_HORIZON_DAYS} (got {})",
                self.horizon_days
            ));
        }
        for (name, value) in [
            ("lunch_duration_minutes", self.lunch_duration_minutes),
            ("break_minutes", self.break_minutes),
        ] {
            if !(0..=MINUTES_PER_DAY).contains(&value) {
                return Err(format!("{name} must be within 0..={MINUTES_PER_DAY} (got {value})"));
            }
        }
        Ok(())
    }

    pub fn preferred_time_for(&self, category: Option<&str>) -> Option<TimeOfDay> {
        let c = category?.trim().to_lowercase();
        self.category_times.get(&c).copied()
    }
}

/// Heuristic scoring weights. Tuned empirically; treat as configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Deadline within `urgent_hours` of the candidate start.
    pub deadline_urgent: f64,
    /// Deadline within `soon_hours` of the candidate start.
    pub deadline_soon: f64,
    pub urgent_hours: i64,
    pub soon_hours: i64,
    pub location: f64,
    pub preference: f64,
    pub energy: f64,
    pub continuity: f64,
    /// Max gap that still counts as "adjacent" for location/continuity.
    pub adjacency_minutes: i64,
    /// Candidates within this distance of the best score are ties.
    pub tie_epsilon: f64,
    pub max_oracle_candidates: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            deadline_urgent: 30.0,
            deadline_soon: 10.0,
            urgent_hours: 24,
            soon_hours: 72,
            location: 15.0,
            preference: 20.0,
            energy: 15.0,
            continuity: 10.0,
            adjacency_minutes: 30,
            tie_epsilon: 0.5,
            max_oracle_candidates: 5,
        }
    }
}

fn clock(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

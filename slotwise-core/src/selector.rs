//! Slot Selector: candidate enumeration, multi-factor scoring, and
//! oracle tie-breaking with a deterministic fallback.
//!
//! Ranking (deterministic):
//! - score DESC
//! - start ASC
//!
//! Only candidates within `tie_epsilon` of the best score are sent to the
//! oracle; everything else is decided here.

use chrono::{Duration, NaiveDateTime};

use crate::availability::AvailabilityMatrix;
use crate::constraints::ConstraintSet;
use crate::oracle::{DecisionOracle, OracleRequest, RankedCandidate, HEURISTIC_RATIONALE};
use crate::plan::SchedulingPlanItem;
use crate::preferences::Preferences;
use crate::task::{EnergyLevel, Task};
use crate::time::TimeSlot;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotChoice {
    /// `None` when no candidate exists.
    pub slot: Option<TimeSlot>,
    pub rationale: String,
    pub score: f64,
    /// True when the oracle made the final call.
    pub via_oracle: bool,
}

impl SlotChoice {
    fn none(rationale: impl Into<String>) -> Self {
        Self {
            slot: None,
            rationale: rationale.into(),
            score: 0.0,
            via_oracle: false,
        }
    }
}

/// Every free window that fits the task and its constraints.
///
/// With `respect_deadline = false` the deadline filter is skipped; the planner
/// uses that to tell "no room" apart from "no room before the deadline".
pub fn candidate_windows(
    task: &Task,
    availability: &AvailabilityMatrix,
    preferences: &Preferences,
    respect_deadline: bool,
) -> Vec<TimeSlot> {
    let constraints = ConstraintSet::parse(&task.constraints);
    let Some(today) = availability.first_day() else {
        return Vec::new();
    };
    let g = availability.granularity_minutes();
    let needed = ((task.duration_minutes + g - 1) / g).max(1) as usize;
    let duration = Duration::minutes(task.duration_minutes);
    let deadline_ok = |end: NaiveDateTime| match (respect_deadline, task.deadline) {
        (true, Some(dl)) => end <= dl,
        _ => true,
    };

    let mut out = Vec::new();
    for (day, slots) in availability.days() {
        if !constraints.allows_day(*day, today) {
            continue;
        }

        if let Some(exact) = constraints.exact_start() {
            let start = day.and_time(exact);
            let end = start + duration;
            if availability.is_free(start, end)
                && constraints.admits(start, end, preferences)
                && deadline_ok(end)
            {
                out.push(TimeSlot::new(start, end));
            }
            continue;
        }

        if slots.len() < needed {
            continue;
        }
        for i in 0..=(slots.len() - needed) {
            if !slots[i..i + needed].iter().all(|s| s.available) {
                continue;
            }
            let start = slots[i].start;
            let end = start + duration;
            if constraints.admits(start, end, preferences) && deadline_ok(end) {
                out.push(TimeSlot::new(start, end));
            }
        }
    }
    out
}

/// Weighted heuristic score plus the names of the factors that fired.
pub fn score_candidate(
    task: &Task,
    slot: &TimeSlot,
    already_placed: &[SchedulingPlanItem],
    preferences: &Preferences,
) -> (f64, Vec<&'static str>) {
    let w = &preferences.weights;
    let mut score = 0.0;
    let mut factors = Vec::new();

    // Deadline urgency
    if let Some(dl) = task.deadline {
        let hours_left = (dl - slot.start).num_minutes() as f64 / 60.0;
        if hours_left < w.urgent_hours as f64 {
            score += w.deadline_urgent;
            factors.push("deadline urgency");
        } else if hours_left < w.soon_hours as f64 {
            score += w.deadline_soon;
            factors.push("deadline urgency");
        }
    }

    // Location grouping / category continuity
    let adjacent: Vec<&SchedulingPlanItem> = already_placed
        .iter()
        .filter(|p| gap_minutes(slot, p) <= w.adjacency_minutes)
        .collect();
    if let Some(loc) = task.location.as_deref().map(normalize) {
        if !loc.is_empty()
            && adjacent
                .iter()
                .any(|p| p.location.as_deref().map(normalize).as_deref() == Some(loc.as_str()))
        {
            score += w.location;
            factors.push("location grouping");
        }
    }
    if let Some(cat) = task.category.as_deref().map(normalize) {
        if adjacent
            .iter()
            .any(|p| p.category.as_deref().map(normalize).as_deref() == Some(cat.as_str()))
        {
            score += w.continuity;
            factors.push("continuity");
        }
    }

    // Category time-of-day preference
    if let Some(pref) = preferences.preferred_time_for(task.category.as_deref()) {
        if pref.contains(slot.start.time()) {
            score += w.preference;
            factors.push("preferred time of day");
        }
    }

    // Energy match
    if task.energy == Some(EnergyLevel::High) {
        if let Some(peak) = preferences.most_productive_time {
            if peak.contains(slot.start.time()) {
                score += w.energy;
                factors.push("energy match");
            }
        }
    }

    (score, factors)
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn gap_minutes(slot: &TimeSlot, placed: &SchedulingPlanItem) -> i64 {
    if slot.start >= placed.end {
        (slot.start - placed.end).num_minutes()
    } else if slot.end <= placed.start {
        (placed.start - slot.end).num_minutes()
    } else {
        0
    }
}

/// Score and order candidates best-first.
pub fn rank_candidates(
    task: &Task,
    candidates: Vec<TimeSlot>,
    already_placed: &[SchedulingPlanItem],
    preferences: &Preferences,
) -> Vec<(RankedCandidate, Vec<&'static str>)> {
    let mut ranked: Vec<(RankedCandidate, Vec<&'static str>)> = candidates
        .into_iter()
        .map(|slot| {
            let (score, factors) = score_candidate(task, &slot, already_placed, preferences);
            (RankedCandidate { slot, score }, factors)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.0.score
            .total_cmp(&a.0.score)
            .then_with(|| a.0.slot.start.cmp(&b.0.slot.start))
    });
    ranked
}

/// Pick a slot for `task`, or `None` if nothing fits.
///
/// Oracle failures never produce `None`: they fall back to the top-ranked
/// candidate.
pub fn select_slot(
    task: &Task,
    availability: &AvailabilityMatrix,
    already_placed: &[SchedulingPlanItem],
    preferences: &Preferences,
    oracle: &dyn DecisionOracle,
) -> SlotChoice {
    let candidates = candidate_windows(task, availability, preferences, true);
    if candidates.is_empty() {
        return SlotChoice::none(format!(
            "No free window of {} minutes satisfies the task's constraints.",
            task.duration_minutes
        ));
    }

    let ranked = rank_candidates(task, candidates, already_placed, preferences);
    let best_score = ranked[0].0.score;
    let eps = preferences.weights.tie_epsilon;
    let limit = preferences.weights.max_oracle_candidates.max(1);
    let tied: Vec<RankedCandidate> = ranked
        .iter()
        .take_while(|(c, _)| c.score >= best_score - eps)
        .take(limit)
        .map(|(c, _)| c.clone())
        .collect();

    tracing::debug!(
        task = %task.id,
        candidates = ranked.len(),
        tied = tied.len(),
        best_score,
        "ranked candidate slots"
    );

    if tied.len() > 1 {
        let request = OracleRequest {
            task,
            candidates: &tied,
            already_placed,
        };
        match oracle.rank(&request) {
            Ok(choice) if choice.index < tied.len() => {
                let picked = &tied[choice.index];
                return SlotChoice {
                    slot: Some(picked.slot),
                    rationale: choice.rationale,
                    score: picked.score,
                    via_oracle: true,
                };
            }
            Ok(choice) => {
                tracing::warn!(
                    task = %task.id,
                    index = choice.index,
                    "oracle returned out-of-range index; using heuristic choice"
                );
            }
            Err(e) => {
                tracing::warn!(task = %task.id, error = %e, "oracle unavailable; using heuristic choice");
            }
        }
    }

    let (best, factors) = &ranked[0];
    SlotChoice {
        slot: Some(best.slot),
        rationale: heuristic_rationale(factors),
        score: best.score,
        via_oracle: false,
    }
}

fn heuristic_rationale(factors: &[&str]) -> String {
    if factors.is_empty() {
        HEURISTIC_RATIONALE.to_string()
    } else {
        format!("Heuristic choice favouring {}.", factors.join(", "))
    }
}

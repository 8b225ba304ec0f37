//! Availability Engine: per-day free/busy grid from a calendar snapshot.
//!
//! Pure and deterministic. Identical inputs always produce an identical matrix.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AvailabilityError;
use crate::preferences::{Preferences, MAX_HORIZON_DAYS};
use crate::time::{overlaps, TimeSlot};

/// An existing calendar entry, as returned by a calendar reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub is_movable: bool,
}

impl CalendarEvent {
    pub fn new(summary: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            summary: summary.into(),
            start,
            end,
            is_movable: false,
        }
    }

    pub fn movable(mut self) -> Self {
        self.is_movable = true;
        self
    }

    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if self.end <= self.start {
            return Err(AvailabilityError::InvalidEvent {
                summary: self.summary.clone(),
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        overlaps(self.start, self.end, start, end)
    }
}

/// Calendar date -> ordered slots covering the full day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityMatrix {
    granularity_minutes: i64,
    days: BTreeMap<NaiveDate, Vec<TimeSlot>>,
}

impl AvailabilityMatrix {
    /// All-available grid for `horizon_days` days starting at `start`.
    pub fn empty(start: NaiveDate, horizon_days: u32, granularity_minutes: i64) -> Self {
        let mut days = BTreeMap::new();
        let step = Duration::minutes(granularity_minutes);
        for offset in 0..horizon_days {
            let day = start + Duration::days(offset as i64);
            let day_start = day.and_time(NaiveTime::MIN);
            let day_end = day_start + Duration::days(1);
            let mut slots = Vec::with_capacity((1440 / granularity_minutes) as usize);
            let mut cursor = day_start;
            while cursor < day_end {
                slots.push(TimeSlot::new(cursor, cursor + step));
                cursor += step;
            }
            days.insert(day, slots);
        }
        Self {
            granularity_minutes,
            days,
        }
    }

    pub fn granularity_minutes(&self) -> i64 {
        self.granularity_minutes
    }

    pub fn days(&self) -> impl Iterator<Item = (&NaiveDate, &Vec<TimeSlot>)> {
        self.days.iter()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&[TimeSlot]> {
        self.days.get(&date).map(|v| v.as_slice())
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    /// Start of the first day to the end of the last day.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.first_day()?;
        let last = self.last_day()?;
        Some((
            first.and_time(NaiveTime::MIN),
            last.and_time(NaiveTime::MIN) + Duration::days(1),
        ))
    }

    /// Mark every slot overlapping `[start, end)` unavailable.
    pub fn occupy(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        for slots in self.days.values_mut() {
            for slot in slots.iter_mut() {
                if slot.overlaps(start, end) {
                    slot.available = false;
                }
            }
        }
    }

    /// Mark every slot starting before `now` unavailable.
    pub fn block_before(&mut self, now: NaiveDateTime) {
        for slots in self.days.values_mut() {
            for slot in slots.iter_mut() {
                if slot.start < now {
                    slot.available = false;
                }
            }
        }
    }

    /// True when `[start, end)` lies inside the horizon and every slot it
    /// touches is available.
    pub fn is_free(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        let Some((lo, hi)) = self.span() else {
            return false;
        };
        if start < lo || end > hi || end <= start {
            return false;
        }
        self.days
            .values()
            .flat_map(|slots| slots.iter())
            .filter(|s| s.overlaps(start, end))
            .all(|s| s.available)
    }

    /// Longest contiguous free run in the horizon: (start, minutes).
    /// Earliest run wins on equal length.
    pub fn longest_free_run(&self) -> Option<(NaiveDateTime, i64)> {
        let mut best: Option<(NaiveDateTime, i64)> = None;
        for slots in self.days.values() {
            let mut run: Option<(NaiveDateTime, i64)> = None;
            for slot in slots {
                if slot.available {
                    run = match run {
                        Some((s, m)) => Some((s, m + slot.duration_minutes())),
                        None => Some((slot.start, slot.duration_minutes())),
                    };
                    if let Some((s, m)) = run {
                        if best.is_none_or(|(_, bm)| m > bm) {
                            best = Some((s, m));
                        }
                    }
                } else {
                    run = None;
                }
            }
        }
        best
    }

    /// Slots within a day must be contiguous, non-overlapping, and cover the
    /// whole day.
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        for (day, slots) in &self.days {
            let broken = |detail: String| AvailabilityError::BrokenGrid {
                day: day.to_string(),
                detail,
            };
            let day_start = day.and_time(NaiveTime::MIN);
            let day_end = day_start + Duration::days(1);
            let Some(first) = slots.first() else {
                return Err(broken("no slots".to_string()));
            };
            if first.start != day_start {
                return Err(broken(format!("first slot starts at {}", first.start)));
            }
            for pair in slots.windows(2) {
                if pair[0].end != pair[1].start {
                    return Err(broken(format!(
                        "slot ending {} followed by slot starting {}",
                        pair[0].end, pair[1].start
                    )));
                }
            }
            if let Some(s) = slots.iter().find(|s| s.end <= s.start) {
                return Err(broken(format!("empty slot at {}", s.start)));
            }
            if slots.last().map(|s| s.end) != Some(day_end) {
                return Err(broken("last slot does not end at midnight".to_string()));
            }
        }
        Ok(())
    }
}

/// Build the availability matrix for `horizon_days` days from `start`.
///
/// 1. every slot starts available
/// 2. slots overlapping any event become unavailable
/// 3. slots outside work hours, or inside lunch, become unavailable
pub fn build_availability(
    events: &[CalendarEvent],
    preferences: &Preferences,
    start: NaiveDate,
    horizon_days: u32,
) -> Result<AvailabilityMatrix, AvailabilityError> {
    preferences
        .validate()
        .map_err(AvailabilityError::InvalidPreferences)?;
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(AvailabilityError::InvalidPreferences(format!(
            "horizon_days must be within 1..={MAX_HORIZON_DAYS} (got {horizon_days})"
        )));
    }
    for ev in events {
        ev.validate()?;
    }

    let mut matrix =
        AvailabilityMatrix::empty(start, horizon_days, preferences.slot_granularity_minutes);

    for ev in events {
        matrix.occupy(ev.start, ev.end);
    }

    apply_preferences(&mut matrix, preferences);
    matrix.validate()?;

    tracing::debug!(
        days = horizon_days,
        events = events.len(),
        "built availability matrix"
    );
    Ok(matrix)
}

fn apply_preferences(matrix: &mut AvailabilityMatrix, preferences: &Preferences) {
    for (day, slots) in matrix.days.iter_mut() {
        let work_start = day.and_time(preferences.work_hours_start);
        let work_end = day.and_time(preferences.work_hours_end);
        let lunch = preferences.lunch_start.and_then(|l| {
            (preferences.lunch_duration_minutes > 0).then(|| {
                let s = day.and_time(l);
                (s, s + Duration::minutes(preferences.lunch_duration_minutes))
            })
        });

        for slot in slots.iter_mut() {
            if slot.start < work_start || slot.end > work_end {
                slot.available = false;
            }
            if let Some((ls, le)) = lunch {
                if slot.overlaps(ls, le) {
                    slot.available = false;
                }
            }
        }
    }
}

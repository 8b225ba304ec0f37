//! Time primitives: slots, time-of-day bands and loose clock parsing.
//!
//! Everything here is naive local time. Timezone handling lives at the CLI edge.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// A concrete `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub available: bool,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            available: true,
        }
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        overlaps(self.start, self.end, start, end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Half-open interval overlap.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    /// Morning 05:00-12:00, afternoon 12:00-17:00, evening 17:00-23:00.
    pub fn contains(&self, t: NaiveTime) -> bool {
        let h = t.hour();
        match self {
            TimeOfDay::Morning => (5..12).contains(&h),
            TimeOfDay::Afternoon => (12..17).contains(&h),
            TimeOfDay::Evening => (17..23).contains(&h),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Some(TimeOfDay::Morning),
            "afternoon" => Some(TimeOfDay::Afternoon),
            "evening" | "night" => Some(TimeOfDay::Evening),
            _ => None,
        }
    }
}

/// Parse "14:00", "9:30", "5pm", "5:30 pm", "noon", "midnight".
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let (body, meridiem) = if let Some(b) = s.strip_suffix("am") {
        (b.trim(), Some(false))
    } else if let Some(b) = s.strip_suffix("pm") {
        (b.trim(), Some(true))
    } else {
        (s.as_str(), None)
    };

    let (h, m) = match body.split_once(':') {
        Some((h, m)) => (h.trim().parse::<u32>().ok()?, m.trim().parse::<u32>().ok()?),
        None => (body.parse::<u32>().ok()?, 0),
    };

    let h = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&h) {
                return None;
            }
            match (pm, h) {
                (false, 12) => 0,
                (true, 12) => 12,
                (true, h) => h + 12,
                (false, h) => h,
            }
        }
        None => h,
    };

    NaiveTime::from_hms_opt(h, m, 0)
}

/// Format "HH:MM".
pub fn fmt_clock(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_clock_accepts_24h_and_meridiem() {
        assert_eq!(parse_clock("14:00"), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(parse_clock("9:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock("5pm"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_clock("5:30 PM"), NaiveTime::from_hms_opt(17, 30, 0));
        assert_eq!(parse_clock("12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_clock("12pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_clock("noon"), NaiveTime::from_hms_opt(12, 0, 0));
    }

    #[test]
    fn parse_clock_rejects_garbage() {
        assert_eq!(parse_clock("25:00"), None);
        assert_eq!(parse_clock("13pm"), None);
        assert_eq!(parse_clock("soon"), None);
    }

    #[test]
    fn time_of_day_bands() {
        assert!(TimeOfDay::Evening.contains(hm(17, 0)));
        assert!(!TimeOfDay::Evening.contains(hm(16, 45)));
        assert!(TimeOfDay::Morning.contains(hm(9, 0)));
        assert!(TimeOfDay::Afternoon.contains(hm(12, 0)));
    }
}

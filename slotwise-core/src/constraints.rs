//! Loose parsing of free-text task constraints.
//!
//! Not a grammar. Each hint is matched against a small set of patterns;
//! anything unrecognized is ignored.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::preferences::Preferences;
use crate::time::{parse_clock, TimeOfDay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRef {
    Today,
    Tomorrow,
    Date(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeConstraint {
    /// "at 14:00": start exactly then.
    ExactStart(NaiveTime),
    /// "after 17:00": start at or after.
    NotBefore(NaiveTime),
    /// "before 12:00": end at or before.
    NotAfter(NaiveTime),
    /// "before EOD": end by the end of work hours.
    EndOfDay,
    /// "in the morning": start inside the band.
    Band(TimeOfDay),
    OnDay(DayRef),
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    At,
    After,
    Before,
    Eod,
    Band,
    Today,
    Tomorrow,
    OnDate,
}

const PATTERNS: &[(Rule, &str)] = &[
    (Rule::Eod, r"^(?:before|by|until)?\s*(?:eod|end of (?:the )?(?:work ?)?day)$"),
    (Rule::At, r"^(?:at|@)\s+(.+)$"),
    (Rule::After, r"^(?:after|from|not before|starting(?: at)?)\s+(.+)$"),
    (Rule::Before, r"^(?:before|by|until|no later than)\s+(.+)$"),
    (Rule::Band, r"^(?:in the\s+|this\s+)?(morning|afternoon|evening|night|tonight)$"),
    (Rule::Today, r"^today$"),
    (Rule::Tomorrow, r"^tomorrow$"),
    (Rule::OnDate, r"^on\s+(\d{4}-\d{2}-\d{2})$"),
];

static RULES: LazyLock<Vec<(Rule, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(rule, pat)| Regex::new(&format!("(?i){pat}")).ok().map(|re| (*rule, re)))
        .collect()
});

/// Parse one hint. `None` when it matches nothing we understand.
pub fn parse_constraint(text: &str) -> Option<TimeConstraint> {
    let text = text.trim();
    for (rule, re) in RULES.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let arg = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let parsed = match rule {
            Rule::Eod => Some(TimeConstraint::EndOfDay),
            Rule::At => parse_clock(arg).map(TimeConstraint::ExactStart),
            Rule::After => parse_clock(arg).map(TimeConstraint::NotBefore),
            Rule::Before => parse_clock(arg).map(TimeConstraint::NotAfter),
            Rule::Band => {
                let band = if arg.eq_ignore_ascii_case("tonight") { "evening" } else { arg };
                TimeOfDay::parse(band).map(TimeConstraint::Band)
            }
            Rule::Today => Some(TimeConstraint::OnDay(DayRef::Today)),
            Rule::Tomorrow => Some(TimeConstraint::OnDay(DayRef::Tomorrow)),
            Rule::OnDate => NaiveDate::parse_from_str(arg, "%Y-%m-%d")
                .ok()
                .map(|d| TimeConstraint::OnDay(DayRef::Date(d))),
        };
        if parsed.is_some() {
            return parsed;
        }
    }
    None
}

/// All recognized constraints of one task, combined with AND (bands with OR).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    items: Vec<TimeConstraint>,
}

impl ConstraintSet {
    pub fn parse(constraints: &[String]) -> Self {
        let items = constraints
            .iter()
            .filter_map(|c| {
                let parsed = parse_constraint(c);
                if parsed.is_none() {
                    tracing::debug!(constraint = %c, "ignoring unrecognized constraint");
                }
                parsed
            })
            .collect();
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First exact-start constraint, if any.
    pub fn exact_start(&self) -> Option<NaiveTime> {
        self.items.iter().find_map(|c| match c {
            TimeConstraint::ExactStart(t) => Some(*t),
            _ => None,
        })
    }

    /// Whether `date` is eligible given day references relative to `today`.
    pub fn allows_day(&self, date: NaiveDate, today: NaiveDate) -> bool {
        self.items.iter().all(|c| match c {
            TimeConstraint::OnDay(DayRef::Today) => date == today,
            TimeConstraint::OnDay(DayRef::Tomorrow) => date == today + Duration::days(1),
            TimeConstraint::OnDay(DayRef::Date(d)) => date == *d,
            _ => true,
        })
    }

    /// Whether the window `[start, end)` satisfies every time-of-day constraint.
    pub fn admits(&self, start: NaiveDateTime, end: NaiveDateTime, prefs: &Preferences) -> bool {
        let day = start.date();
        let mut bands = Vec::new();
        for c in &self.items {
            let ok = match c {
                TimeConstraint::ExactStart(t) => start.time() == *t,
                TimeConstraint::NotBefore(t) => start >= day.and_time(*t),
                TimeConstraint::NotAfter(t) => end <= day.and_time(*t),
                TimeConstraint::EndOfDay => end <= day.and_time(prefs.work_hours_end),
                TimeConstraint::Band(b) => {
                    bands.push(*b);
                    true
                }
                TimeConstraint::OnDay(_) => true,
            };
            if !ok {
                return false;
            }
        }
        bands.is_empty() || bands.iter().any(|b| b.contains(start.time()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(RULES.len(), PATTERNS.len());
    }

    #[test]
    fn parses_common_hints() {
        assert_eq!(parse_constraint("at 14:00"), Some(TimeConstraint::ExactStart(t(14, 0))));
        assert_eq!(parse_constraint("At 3pm"), Some(TimeConstraint::ExactStart(t(15, 0))));
        assert_eq!(parse_constraint("after 17:00"), Some(TimeConstraint::NotBefore(t(17, 0))));
        assert_eq!(parse_constraint("after 5pm"), Some(TimeConstraint::NotBefore(t(17, 0))));
        assert_eq!(parse_constraint("before 12:00"), Some(TimeConstraint::NotAfter(t(12, 0))));
        assert_eq!(parse_constraint("before EOD"), Some(TimeConstraint::EndOfDay));
        assert_eq!(parse_constraint("by end of day"), Some(TimeConstraint::EndOfDay));
        assert_eq!(
            parse_constraint("in the morning"),
            Some(TimeConstraint::Band(TimeOfDay::Morning))
        );
        assert_eq!(parse_constraint("tonight"), Some(TimeConstraint::Band(TimeOfDay::Evening)));
        assert_eq!(parse_constraint("tomorrow"), Some(TimeConstraint::OnDay(DayRef::Tomorrow)));
        assert_eq!(
            parse_constraint("on 2026-03-04"),
            Some(TimeConstraint::OnDay(DayRef::Date(
                NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
            )))
        );
    }

    #[test]
    fn unknown_hints_are_ignored() {
        assert_eq!(parse_constraint("bring snacks"), None);
        assert_eq!(parse_constraint("after lunch"), None);
        let set = ConstraintSet::parse(&["bring snacks".to_string()]);
        assert!(set.is_empty());
    }

    #[test]
    fn admits_respects_windows() {
        let prefs = Preferences::default();
        let set = ConstraintSet::parse(&["after 17:00".to_string()]);
        let d = day();
        assert!(!set.admits(d.and_time(t(16, 0)), d.and_time(t(17, 0)), &prefs));
        assert!(set.admits(d.and_time(t(17, 0)), d.and_time(t(18, 0)), &prefs));

        let eod = ConstraintSet::parse(&["before EOD".to_string()]);
        assert!(eod.admits(d.and_time(t(17, 0)), d.and_time(t(18, 0)), &prefs));
        assert!(!eod.admits(d.and_time(t(17, 30)), d.and_time(t(18, 30)), &prefs));
    }

    #[test]
    fn day_references_are_relative_to_today() {
        let set = ConstraintSet::parse(&["tomorrow".to_string()]);
        let today = day();
        assert!(!set.allows_day(today, today));
        assert!(set.allows_day(today + Duration::days(1), today));
    }
}

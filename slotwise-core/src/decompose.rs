//! Decomposition payload: the JSON a language model returns when asked to
//! split free text into tasks.
//!
//! ```json
//! {"tasks": [{"title": "Gym", "duration_minutes": 60, "priority": "high",
//!             "constraints": ["after 17:00"], "category": "exercise"}]}
//! ```

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::task::{EnergyLevel, Task, TaskKind, TaskStatus};

pub const DEFAULT_DURATION_MINUTES: i64 = 30;

/// Turns raw user input into tasks. Implementations live outside the core.
pub trait Decomposer: Send + Sync {
    fn decompose(&self, raw_input: &str) -> Result<Vec<Task>>;
}

impl<T: Decomposer + ?Sized> Decomposer for Box<T> {
    fn decompose(&self, raw_input: &str) -> Result<Vec<Task>> {
        (**self).decompose(raw_input)
    }
}

/// Tasks given up front (e.g. loaded from a file). Ignores the input text.
#[derive(Debug, Clone, Default)]
pub struct StaticDecomposer {
    pub tasks: Vec<Task>,
}

impl StaticDecomposer {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

impl Decomposer for StaticDecomposer {
    fn decompose(&self, _raw_input: &str) -> Result<Vec<Task>> {
        Ok(self.tasks.clone())
    }
}

/// Drop a surrounding ``` fence (with or without a language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct Payload {
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    duration_minutes: Option<i64>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    contacts: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    priority_num: Option<u32>,
    #[serde(default)]
    deadline: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    energy: Option<String>,
}

/// Parse a decomposition reply. Strict JSON after fence stripping; unknown
/// enum strings fall back to defaults rather than failing the whole payload.
pub fn parse_task_payload(text: &str) -> Result<Vec<Task>> {
    let body = strip_code_fence(text);
    let payload: Payload = serde_json::from_str(body).context("parse decomposition payload")?;

    let mut tasks = Vec::with_capacity(payload.tasks.len());
    for (i, raw) in payload.tasks.into_iter().enumerate() {
        let title = raw.title.trim().to_string();
        if title.is_empty() {
            bail!("task {} has an empty title", i + 1);
        }
        let id = raw
            .id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("task-{}", i + 1));

        let mut task = Task::new(id, title);
        task.kind = match raw.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("travel") => TaskKind::Travel,
            _ => TaskKind::Activity,
        };
        task.duration_minutes = raw.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        task.priority = priority_number(raw.priority.as_deref(), raw.priority_num);
        task.constraints = raw
            .constraints
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        task.deadline = match raw.deadline.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(
                parse_deadline(s).with_context(|| format!("task '{}' deadline", task.id))?,
            ),
            _ => None,
        };
        task.location = raw.location.filter(|s| !s.trim().is_empty());
        task.category = raw
            .category
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty());
        task.energy = match raw.energy.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("low") => Some(EnergyLevel::Low),
            Some("medium") => Some(EnergyLevel::Medium),
            Some("high") => Some(EnergyLevel::High),
            _ => None,
        };
        task.contacts = raw.contacts;
        task.notes = raw.notes.unwrap_or_default();
        if let Some(c) = raw.confidence {
            task.confidence = c.clamp(0.0, 1.0);
        }
        task.status = TaskStatus::Unscheduled;
        tasks.push(task);
    }
    Ok(tasks)
}

/// The label wins over the number; `high|medium|low` map to `1|2|3`.
fn priority_number(label: Option<&str>, num: Option<u32>) -> u32 {
    match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => 1,
        Some("medium") => 2,
        Some("low") => 3,
        _ => num.unwrap_or(2),
    }
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM`, or a bare date
/// (end of that day).
pub fn parse_deadline(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("unrecognized deadline '{s}'"))?;
    date.and_hms_opt(23, 59, 0)
        .with_context(|| format!("unrecognized deadline '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn parses_full_payload() {
        let text = r#"```json
{"tasks": [
  {"title": "Write report", "duration_minutes": 120, "priority": "high",
   "constraints": ["before EOD"], "category": "Work", "energy": "high"},
  {"id": "gym", "title": "Gym", "duration_minutes": 60, "priority_num": 3,
   "constraints": ["after 17:00", ""], "category": "exercise",
   "deadline": "2026-03-02T20:00"}
]}
```"#;
        let tasks = parse_task_payload(text).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "task-1");
        assert_eq!(tasks[0].priority, 1);
        assert_eq!(tasks[0].category.as_deref(), Some("work"));
        assert_eq!(tasks[0].energy, Some(EnergyLevel::High));
        assert_eq!(tasks[1].id, "gym");
        assert_eq!(tasks[1].priority, 3);
        assert_eq!(tasks[1].constraints, vec!["after 17:00".to_string()]);
        assert_eq!(
            tasks[1].deadline,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(20, 0, 0)
        );
    }

    #[test]
    fn missing_duration_defaults() {
        let tasks = parse_task_payload(r#"{"tasks":[{"title":"Call mom","kind":"travel"}]}"#).unwrap();
        assert_eq!(tasks[0].duration_minutes, DEFAULT_DURATION_MINUTES);
        assert_eq!(tasks[0].priority, 2);
        assert_eq!(tasks[0].kind, TaskKind::Travel);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_task_payload("sure! here are your tasks").is_err());
        assert!(parse_task_payload(r#"{"tasks":[{"title":"  "}]}"#).is_err());
        assert!(parse_task_payload(r#"{"tasks":[{"title":"x","deadline":"soon"}]}"#).is_err());
    }

    #[test]
    fn bare_date_deadline_is_end_of_day() {
        let dl = parse_deadline("2026-03-05").unwrap();
        assert_eq!(dl.format("%H:%M").to_string(), "23:59");
    }
}

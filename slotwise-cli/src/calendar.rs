use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use slotwise_core::{CalendarWriter, SchedulingPlanItem};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::time::local_to_utc;

#[derive(Debug, Clone, PartialEq)]
pub struct IcsEvent {
    pub uid: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
}

impl IcsEvent {
    /// The UID is derived from the task and its start, so re-importing the
    /// same plan updates rather than duplicates.
    pub fn from_plan_item(item: &SchedulingPlanItem, tz: Tz) -> Result<Self> {
        Ok(Self {
            uid: format!("{}-{}@slotwise", item.task_id, item.start.format("%Y%m%dT%H%M")),
            start_utc: local_to_utc(item.start, tz)?,
            end_utc: local_to_utc(item.end, tz)?,
            summary: item.title.clone(),
            description: format!("Task: {}\n{}", item.task_id, item.rationale),
            location: item.location.clone(),
        })
    }
}

pub fn plan_to_events(plan: &[SchedulingPlanItem], tz: Tz) -> Result<Vec<IcsEvent>> {
    plan.iter()
        .map(|item| IcsEvent::from_plan_item(item, tz))
        .collect()
}

/// Minimal VCALENDAR with one VEVENT per event. Times are UTC.
pub fn events_to_ics(events: &[IcsEvent]) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//slotwise//EN\r\n");

    for e in events {
        s.push_str("BEGIN:VEVENT\r\n");
        s.push_str(&format!("UID:{}\r\n", e.uid));
        s.push_str(&format!("DTSTART:{}\r\n", e.start_utc.format("%Y%m%dT%H%M%SZ")));
        s.push_str(&format!("DTEND:{}\r\n", e.end_utc.format("%Y%m%dT%H%M%SZ")));
        s.push_str(&format!("SUMMARY:{}\r\n", escape_ics(&e.summary)));
        s.push_str(&format!("DESCRIPTION:{}\r\n", escape_ics(&e.description)));
        if let Some(loc) = &e.location {
            s.push_str(&format!("LOCATION:{}\r\n", escape_ics(loc)));
        }
        s.push_str("END:VEVENT\r\n");
    }

    s.push_str("END:VCALENDAR\r\n");
    s
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// Accumulates events and rewrites one .ics file after every insert.
pub struct IcsFileWriter {
    path: PathBuf,
    tz: Tz,
    events: Mutex<Vec<IcsEvent>>,
}

impl IcsFileWriter {
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            path: path.into(),
            tz,
            events: Mutex::new(Vec::new()),
        }
    }
}

impl CalendarWriter for IcsFileWriter {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> Result<String> {
        let event = IcsEvent::from_plan_item(item, self.tz)?;
        let uid = event.uid.clone();
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("ics writer lock poisoned"))?;
        events.push(event);
        std::fs::write(&self.path, events_to_ics(&events))
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(uid)
    }
}

/// Imports each event through `gcalcli import`.
pub struct GcalcliWriter {
    calendar: Option<String>,
    tz: Tz,
}

impl GcalcliWriter {
    pub fn new(calendar: Option<String>, tz: Tz) -> Result<Self> {
        if which::which("gcalcli").is_err() {
            bail!(
                "gcalcli is not installed. Install it, authenticate, then retry.\n\nmacOS (brew):  brew install gcalcli\nUbuntu (pipx): pipx install gcalcli\n\nOr use: slotwise plan ... --write ics"
            );
        }
        Ok(Self { calendar, tz })
    }
}

impl CalendarWriter for GcalcliWriter {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> Result<String> {
        let event = IcsEvent::from_plan_item(item, self.tz)?;
        push_ics_via_gcalcli(&events_to_ics(std::slice::from_ref(&event)), self.calendar.as_deref())?;
        Ok(event.uid)
    }
}

pub fn push_ics_via_gcalcli(ics: &str, calendar: Option<&str>) -> Result<()> {
    let mut cmd = std::process::Command::new("gcalcli");
    cmd.arg("import");
    if let Some(cal) = calendar {
        cmd.args(["--calendar", cal]);
    }

    let mut child = cmd
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::inherit())
        .spawn()
        .context("spawning gcalcli import")?;

    {
        let stdin = child.stdin.as_mut().context("no stdin")?;
        stdin
            .write_all(ics.as_bytes())
            .context("writing ICS to gcalcli")?;
    }

    let status = child.wait().context("waiting on gcalcli")?;
    if !status.success() {
        bail!("gcalcli import failed: {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item() -> SchedulingPlanItem {
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        SchedulingPlanItem {
            task_id: "report".to_string(),
            title: "Write report, v2".to_string(),
            start: d.and_hms_opt(9, 0, 0).unwrap(),
            end: d.and_hms_opt(11, 0, 0).unwrap(),
            location: Some("Office; 3rd floor".to_string()),
            category: None,
            rationale: "earliest free slot".to_string(),
            score: 0.0,
        }
    }

    #[test]
    fn renders_utc_times_and_escapes_text() {
        let tz: Tz = "America/Chicago".parse().unwrap();
        let events = plan_to_events(&[item()], tz).unwrap();
        let ics = events_to_ics(&events);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("UID:report-20260302T0900@slotwise\r\n"));
        assert!(ics.contains("DTSTART:20260302T150000Z\r\n"));
        assert!(ics.contains("DTEND:20260302T170000Z\r\n"));
        assert!(ics.contains("SUMMARY:Write report\\, v2\r\n"));
        assert!(ics.contains("LOCATION:Office\\; 3rd floor\r\n"));
        assert!(ics.contains("DESCRIPTION:Task: report\\nearliest free slot\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn file_writer_accumulates_events() {
        let dir = tempfile::tempdir().unwrap();
        let tz: Tz = "UTC".parse().unwrap();
        let path = dir.path().join("plan.ics");
        let w = IcsFileWriter::new(&path, tz);
        let mut second = item();
        second.task_id = "gym".to_string();
        assert_eq!(w.create_event("u", &item()).unwrap(), "report-20260302T0900@slotwise");
        w.create_event("u", &second).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("BEGIN:VEVENT").count(), 2);
    }
}

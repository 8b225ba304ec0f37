use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime};
use slotwise_core::{
    CalendarEvent, CalendarWriter, DecisionOracle, DryRunWriter, Feedback, FeedbackPrompt,
    FeedbackSource, HeuristicOracle, Orchestrator, OrchestratorConfig, OracleChoice,
    OracleRequest, PreferenceOverrides, Preferences, SchedulingPlanItem, SessionError, SessionOutcome,
    StaticCalendar, StaticDecomposer, Task, TaskAdjustment,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        fixed_now: Some(at(8, 0)),
        ..OrchestratorConfig::default()
    }
}

fn booked_day() -> StaticCalendar {
    StaticCalendar::new(vec![CalendarEvent::new("Offsite", at(9, 0), at(18, 0))])
}

fn one_day() -> Preferences {
    Preferences::default().with_horizon_days(1)
}

/// Answers every prompt with feedback that changes nothing.
struct StubbornUser {
    asked: Arc<AtomicUsize>,
}

impl FeedbackSource for StubbornUser {
    fn request_feedback(&self, _prompt: &FeedbackPrompt<'_>) -> Option<Feedback> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Some(Feedback {
            note: Some("try again".to_string()),
            ..Feedback::default()
        })
    }
}

/// Shortens the conflicted task on first prompt.
struct Shortener;

impl FeedbackSource for Shortener {
    fn request_feedback(&self, prompt: &FeedbackPrompt<'_>) -> Option<Feedback> {
        let conflict = prompt.conflicts.first()?;
        Some(Feedback::default().adjust(TaskAdjustment::SetDuration {
            task_id: conflict.task_id.clone(),
            minutes: 60,
        }))
    }
}

struct FlakyWriter;

impl CalendarWriter for FlakyWriter {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> anyhow::Result<String> {
        if item.task_id == "b" {
            bail!("calendar API returned 503");
        }
        Ok(format!("evt-{}", item.task_id))
    }
}

struct SlowOracle;

impl DecisionOracle for SlowOracle {
    fn rank(&self, _request: &OracleRequest<'_>) -> anyhow::Result<OracleChoice> {
        std::thread::sleep(Duration::from_millis(150));
        Ok(OracleChoice {
            index: 0,
            rationale: "slow but sure".to_string(),
        })
    }
}

#[test]
fn retries_stop_at_the_bound() {
    let asked = Arc::new(AtomicUsize::new(0));
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("deep", "Deep work").with_duration(180)]),
        booked_day(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config())
    .with_feedback_source(StubbornUser { asked: asked.clone() });

    let res = orch.run_session("u1", "deep work today", one_day());

    assert_eq!(res.retry_count, 3);
    assert_eq!(asked.load(Ordering::SeqCst), 3);
    assert_eq!(res.outcome, SessionOutcome::NeedsInput);
    assert!(res.awaiting_user_input);
    assert_eq!(res.conflicts.len(), 1);
}

#[test]
fn zero_retries_parks_immediately() {
    let asked = Arc::new(AtomicUsize::new(0));
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("deep", "Deep work").with_duration(180)]),
        booked_day(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(OrchestratorConfig {
        max_retries: 0,
        ..config()
    })
    .with_feedback_source(StubbornUser { asked: asked.clone() });

    let res = orch.run_session("u1", "x", one_day());
    assert_eq!(res.retry_count, 0);
    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert!(res.awaiting_user_input);
}

#[test]
fn synchronous_feedback_resolves_conflict() {
    let prefs = Preferences::default()
        .with_work_hours(
            chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        )
        .with_horizon_days(1);
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("a", "Workshop prep").with_duration(180)]),
        StaticCalendar::default(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config())
    .with_feedback_source(Shortener);

    let res = orch.run_session("u1", "x", prefs);
    assert_eq!(res.outcome, SessionOutcome::FullyScheduled);
    assert_eq!(res.retry_count, 1);
    assert_eq!(res.plan[0].start, at(9, 0));
    assert_eq!(res.plan[0].end, at(10, 0));
}

#[test]
fn parked_session_resumes_with_submitted_feedback() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("deep", "Deep work").with_duration(180)]),
        booked_day(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());

    let parked = orch.run_session("u1", "deep work", one_day());
    assert_eq!(parked.outcome, SessionOutcome::NeedsInput);
    assert_eq!(parked.retry_count, 1);
    assert!(orch.session_store().list().unwrap().contains(&parked.session_id));

    let feedback = Feedback {
        preferences: PreferenceOverrides {
            horizon_days: Some(2),
            ..PreferenceOverrides::default()
        },
        ..Feedback::default()
    };
    let resumed = orch.submit_feedback(&parked.session_id, feedback).unwrap();

    assert_eq!(resumed.session_id, parked.session_id);
    assert_eq!(resumed.outcome, SessionOutcome::FullyScheduled);
    assert!(!resumed.awaiting_user_input);
    let next_day = day().succ_opt().unwrap();
    assert_eq!(resumed.plan[0].start, next_day.and_hms_opt(9, 0, 0).unwrap());

    let state = orch.load_session(&parked.session_id).unwrap();
    assert_eq!(state.feedback_log.len(), 1);
    assert_eq!(state.created_events.len(), 1);
}

#[test]
fn feedback_for_unknown_task_is_recorded() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("deep", "Deep work").with_duration(180)]),
        booked_day(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());
    let parked = orch.run_session("u1", "x", one_day());
    let fb = Feedback::default().adjust(TaskAdjustment::Drop {
        task_id: "ghost".to_string(),
    });
    let res = orch.submit_feedback(&parked.session_id, fb).unwrap();
    assert!(res.errors.iter().any(|e| e.contains("ghost")));
    assert_eq!(res.retry_count, 2);
}

#[test]
fn writer_failures_are_recorded_not_fatal() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![
            Task::new("a", "A").with_duration(30),
            Task::new("b", "B").with_duration(30),
        ]),
        StaticCalendar::default(),
        FlakyWriter,
        HeuristicOracle,
    )
    .with_config(config());

    let res = orch.run_session("u1", "x", one_day());
    assert_eq!(res.outcome, SessionOutcome::FullyScheduled);
    assert_eq!(res.plan.len(), 2);
    assert_eq!(res.errors.len(), 1);
    assert!(res.errors[0].contains("503"));
    let state = orch.load_session(&res.session_id).unwrap();
    assert_eq!(state.created_events, vec!["evt-a".to_string()]);
}

#[test]
fn timeout_returns_partial_plan() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![
            Task::new("a", "A").with_duration(60).with_priority(1),
            Task::new("b", "B").with_duration(60).with_priority(2),
        ]),
        StaticCalendar::default(),
        DryRunWriter,
        SlowOracle,
    )
    .with_config(OrchestratorConfig {
        session_timeout: Some(Duration::from_millis(50)),
        ..config()
    });

    let res = orch.run_session("u1", "x", one_day());
    assert_eq!(res.outcome, SessionOutcome::Failed);
    assert_eq!(res.plan.len(), 1);
    assert_eq!(res.plan[0].task_id, "a");
    assert!(res.errors.iter().any(|e| e.contains("timed out")));
    assert!(!res.awaiting_user_input);
}

#[test]
fn empty_decomposition_fails() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(Vec::new()),
        StaticCalendar::default(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());
    let res = orch.run_session("u1", "", one_day());
    assert_eq!(res.outcome, SessionOutcome::Failed);
    assert_eq!(res.errors, vec!["decomposition produced no tasks".to_string()]);
}

#[test]
fn sessions_run_concurrently() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![
            Task::new("a", "A").with_duration(60),
            Task::new("b", "B").with_duration(30),
        ]),
        StaticCalendar::default(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let orch = &orch;
                s.spawn(move || orch.run_session(&format!("user-{i}"), "x", one_day()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ids: HashSet<_> = results.iter().map(|r| r.session_id.clone()).collect();
    assert_eq!(ids.len(), 4);
    for r in &results {
        assert_eq!(r.outcome, SessionOutcome::FullyScheduled);
        assert_eq!(r.plan, results[0].plan);
    }
}

#[test]
fn out_of_range_inputs_fail_the_session() {
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![
            Task::new("forever", "Forever").with_duration(1_000_000_000_000_000),
        ]),
        StaticCalendar::default(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());
    let res = orch.run_session("u1", "x", one_day());
    assert_eq!(res.outcome, SessionOutcome::Failed);
    assert!(res.errors[0].contains("duration_minutes"));

    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("a", "A").with_duration(30)]),
        StaticCalendar::default(),
        DryRunWriter,
        HeuristicOracle,
    )
    .with_config(config());
    for prefs in [
        Preferences {
            break_minutes: 1_000_000_000_000_000,
            ..one_day()
        },
        Preferences {
            lunch_duration_minutes: 1_000_000_000_000_000,
            ..one_day()
        },
        Preferences::default().with_horizon_days(u32::MAX),
    ] {
        let res = orch.run_session("u1", "x", prefs);
        assert_eq!(res.outcome, SessionOutcome::Failed);
        assert!(res.errors[0].starts_with("invalid preferences"));
        assert!(res.plan.is_empty());
    }
}

struct CountingWriter {
    writes: Arc<AtomicUsize>,
}

impl CalendarWriter for CountingWriter {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> anyhow::Result<String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(format!("evt-{}", item.task_id))
    }
}

#[test]
fn parked_session_resumes_only_once_under_concurrent_feedback() {
    let writes = Arc::new(AtomicUsize::new(0));
    let orch = Orchestrator::new(
        StaticDecomposer::new(vec![Task::new("deep", "Deep work").with_duration(180)]),
        booked_day(),
        CountingWriter {
            writes: writes.clone(),
        },
        HeuristicOracle,
    )
    .with_config(config());
    let parked = orch.run_session("u1", "deep work", one_day());
    assert!(parked.awaiting_user_input);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let orch = &orch;
                let id = parked.session_id.clone();
                s.spawn(move || {
                    let feedback = Feedback {
                        preferences: PreferenceOverrides {
                            horizon_days: Some(2),
                            ..PreferenceOverrides::default()
                        },
                        ..Feedback::default()
                    };
                    orch.submit_feedback(&id, feedback)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let resumed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].outcome, SessionOutcome::FullyScheduled);
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(SessionError::NotAwaitingInput(_))
    )));
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert_eq!(orch.load_session(&parked.session_id).unwrap().feedback_log.len(), 1);
}

use anyhow::bail;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use proptest::prelude::*;
use slotwise_core::{
    build_availability, verify_no_overlap, CalendarEvent, ConflictReason, DecisionOracle,
    HeuristicOracle, OracleChoice, OracleRequest, PlannerState, Preferences, SchedulingPlanItem,
    SchedulingPlanner, Task, TaskStatus,
};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn clock(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

struct FailingOracle;

impl DecisionOracle for FailingOracle {
    fn rank(&self, _request: &OracleRequest<'_>) -> anyhow::Result<OracleChoice> {
        bail!("oracle offline")
    }
}

fn plan_with(
    oracle: &dyn DecisionOracle,
    tasks: Vec<Task>,
    events: &[CalendarEvent],
    prefs: &Preferences,
) -> slotwise_core::PlannerOutput {
    let mut matrix = build_availability(events, prefs, day(), prefs.horizon_days).unwrap();
    let mut planner = SchedulingPlanner::new(prefs, oracle, events);
    planner.run(tasks, &mut matrix).unwrap()
}

fn report_and_gym_tasks() -> Vec<Task> {
    vec![
        Task::new("report", "Write report").with_duration(120).with_priority(1),
        Task::new("gym", "Gym")
            .with_duration(60)
            .with_priority(5)
            .with_constraint("after 17:00"),
    ]
}

fn three_hour_long_tasks() -> Vec<Task> {
    (1..=3)
        .map(|i| Task::new(format!("t{i}"), format!("Task {i}")).with_duration(60))
        .collect()
}

fn morning_only() -> Preferences {
    Preferences::default()
        .with_work_hours(clock(9), clock(12))
        .without_lunch()
        .with_horizon_days(1)
}

fn windows(plan: &[SchedulingPlanItem]) -> Vec<(String, NaiveDateTime, NaiveDateTime)> {
    plan.iter()
        .map(|p| (p.task_id.clone(), p.start, p.end))
        .collect()
}

#[test]
fn report_in_the_morning_gym_after_five() {
    let prefs = Preferences::default().with_horizon_days(1);
    let out = plan_with(&HeuristicOracle, report_and_gym_tasks(), &[], &prefs);

    assert_eq!(out.state, PlannerState::Scheduled);
    assert!(out.conflicts.is_empty());
    assert_eq!(
        windows(&out.plan),
        vec![
            ("report".to_string(), at(9, 0), at(11, 0)),
            ("gym".to_string(), at(17, 0), at(18, 0)),
        ]
    );
}

#[test]
fn fully_booked_day_yields_no_available_slot() {
    let prefs = Preferences::default().with_horizon_days(1);
    let events = vec![CalendarEvent::new("Offsite", at(9, 0), at(18, 0))];
    let out = plan_with(
        &HeuristicOracle,
        vec![Task::new("deep", "Deep work").with_duration(180)],
        &events,
        &prefs,
    );

    assert_eq!(out.state, PlannerState::Conflicted);
    assert!(out.plan.is_empty());
    assert_eq!(out.conflicts.len(), 1);
    assert_eq!(out.conflicts[0].task_id, "deep");
    assert_eq!(out.conflicts[0].reason, ConflictReason::NoAvailableSlot);
    assert!(!out.conflicts[0].suggestion.is_empty());
}

#[test]
fn equal_tasks_fill_the_window_back_to_back() {
    let out = plan_with(&HeuristicOracle, three_hour_long_tasks(), &[], &morning_only());

    assert_eq!(
        windows(&out.plan),
        vec![
            ("t1".to_string(), at(9, 0), at(10, 0)),
            ("t2".to_string(), at(10, 0), at(11, 0)),
            ("t3".to_string(), at(11, 0), at(12, 0)),
        ]
    );
    assert!(out.tasks.iter().all(|t| t.status == TaskStatus::Scheduled));
}

#[test]
fn failing_oracle_produces_the_same_plans() {
    let prefs = Preferences::default().with_horizon_days(1);
    let heuristic = plan_with(&HeuristicOracle, report_and_gym_tasks(), &[], &prefs);
    let failing = plan_with(&FailingOracle, report_and_gym_tasks(), &[], &prefs);
    assert_eq!(windows(&heuristic.plan), windows(&failing.plan));

    let heuristic = plan_with(&HeuristicOracle, three_hour_long_tasks(), &[], &morning_only());
    let failing = plan_with(&FailingOracle, three_hour_long_tasks(), &[], &morning_only());
    assert_eq!(windows(&heuristic.plan), windows(&failing.plan));
    assert_eq!(failing.plan.len(), 3);
}

#[test]
fn identical_inputs_give_identical_plans() {
    let prefs = Preferences::default();
    let events = vec![
        CalendarEvent::new("Standup", at(9, 30), at(10, 0)),
        CalendarEvent::new("1:1", at(15, 0), at(15, 30)).movable(),
    ];
    let tasks = || {
        vec![
            Task::new("a", "Review PR").with_duration(45).with_category("work"),
            Task::new("b", "Run").with_duration(30).with_category("exercise"),
            Task::new("c", "Call bank").with_duration(15).with_constraint("before 12:00"),
        ]
    };
    let first = plan_with(&HeuristicOracle, tasks(), &events, &prefs);
    let second = plan_with(&HeuristicOracle, tasks(), &events, &prefs);
    assert_eq!(first, second);
}

#[test]
fn conflict_on_first_task_leaves_room_for_second() {
    let prefs = morning_only();
    let out = plan_with(
        &HeuristicOracle,
        vec![
            Task::new("a", "Too long").with_duration(240).with_priority(1),
            Task::new("b", "Fits").with_duration(60).with_priority(2),
        ],
        &[],
        &prefs,
    );
    assert_eq!(out.conflicts.len(), 1);
    assert_eq!(out.conflicts[0].task_id, "a");
    assert_eq!(windows(&out.plan), vec![("b".to_string(), at(9, 0), at(10, 0))]);
}

const HINTS: &[&str] = &["", "after 14:00", "before 12:00", "morning", "at 10:00", "tomorrow"];

fn task_strategy() -> impl Strategy<Value = (i64, u32, usize)> {
    (1i64..=16, 1u32..=5, 0usize..HINTS.len())
}

fn event_strategy() -> impl Strategy<Value = (i64, u32, i64, bool)> {
    (0i64..3, 8u32..19, 1i64..=12, any::<bool>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plans_never_overlap(
        raw_tasks in prop::collection::vec(task_strategy(), 1..12),
        raw_events in prop::collection::vec(event_strategy(), 0..6),
    ) {
        let prefs = Preferences::default().with_horizon_days(3);
        let events: Vec<CalendarEvent> = raw_events
            .iter()
            .enumerate()
            .map(|(i, (d, h, quarters, movable))| {
                let start = (day() + Duration::days(*d)).and_hms_opt(*h, 0, 0).unwrap();
                let ev = CalendarEvent::new(format!("ev{i}"), start, start + Duration::minutes(quarters * 15));
                if *movable { ev.movable() } else { ev }
            })
            .collect();
        let tasks: Vec<Task> = raw_tasks
            .iter()
            .enumerate()
            .map(|(i, (quarters, prio, hint))| {
                let t = Task::new(format!("t{i}"), format!("Task {i}"))
                    .with_duration(quarters * 15)
                    .with_priority(*prio);
                if HINTS[*hint].is_empty() { t } else { t.with_constraint(HINTS[*hint]) }
            })
            .collect();

        let out = plan_with(&HeuristicOracle, tasks.clone(), &events, &prefs);

        prop_assert!(verify_no_overlap(&out.plan).is_ok());
        prop_assert_eq!(out.plan.len() + out.conflicts.len(), tasks.len());
        for item in &out.plan {
            prop_assert!(item.start.time() >= prefs.work_hours_start);
            prop_assert!(item.end.time() <= prefs.work_hours_end);
            for ev in &events {
                prop_assert!(!ev.overlaps(item.start, item.end), "{} overlaps {}", item.task_id, ev.summary);
            }
        }
    }
}

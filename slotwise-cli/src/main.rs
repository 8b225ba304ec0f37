use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use slotwise_core::{
    CalendarReader, CalendarWriter, DecisionOracle, Decomposer, DryRunWriter, Feedback,
    HeuristicOracle, Orchestrator, PreferenceOverrides, SessionResult, SessionStore,
    StaticCalendar, StaticDecomposer, TaskAdjustment,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod auth;
mod calendar;
mod config;
#[cfg(feature = "gcal")]
mod google_calendar;
mod llm;
mod prompt;
mod state;
mod time;

use config::Config;
use state::FileSessionStore;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SLOTWISE_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "slotwise", version = VERSION, about = "Fit your tasks into the free time on your calendar")]
struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write ~/.slotwise/config.toml with defaults
    InitConfig,

    /// Store model credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Turn a description of your day into a calendar plan
    Plan {
        /// What you need to get done, in your own words
        text: Option<String>,

        /// Skip the model: read tasks from a JSON file ({"tasks": [...]})
        #[arg(long)]
        tasks: Option<PathBuf>,

        /// Existing events as a JSON array (local time)
        #[arg(long)]
        calendar: Option<PathBuf>,

        /// Where to put the plan (defaults to [calendar].write)
        #[arg(long, value_enum)]
        write: Option<WriteTarget>,

        /// Ask for adjustments in the terminal when tasks don't fit
        #[arg(long)]
        interactive: bool,

        /// Override the planning horizon
        #[arg(long)]
        horizon_days: Option<u32>,
    },

    /// Adjust a session that is waiting for input and re-plan it
    Feedback {
        session_id: String,

        /// Remove a task
        #[arg(long, value_name = "TASK")]
        drop: Vec<String>,

        /// New duration, e.g. --duration report=90
        #[arg(long, value_name = "TASK=MINUTES")]
        duration: Vec<String>,

        /// New priority (1 = highest), e.g. --priority gym=1
        #[arg(long, value_name = "TASK=N")]
        priority: Vec<String>,

        /// Add a constraint, e.g. --constraint gym="after 18:00"
        #[arg(long, value_name = "TASK=TEXT")]
        constraint: Vec<String>,

        /// Remove all constraints from a task
        #[arg(long, value_name = "TASK")]
        clear_constraints: Vec<String>,

        /// New deadline ("YYYY-MM-DD HH:MM" or "none")
        #[arg(long, value_name = "TASK=WHEN")]
        deadline: Vec<String>,

        #[arg(long, value_name = "HH:MM")]
        work_start: Option<String>,

        #[arg(long, value_name = "HH:MM")]
        work_end: Option<String>,

        #[arg(long, value_name = "HH:MM", conflicts_with = "no_lunch")]
        lunch: Option<String>,

        #[arg(long)]
        no_lunch: bool,

        #[arg(long)]
        horizon_days: Option<u32>,

        #[arg(long)]
        note: Option<String>,

        /// Existing events, re-read when the horizon grows
        #[arg(long)]
        calendar: Option<PathBuf>,

        #[arg(long, value_enum)]
        write: Option<WriteTarget>,

        #[arg(long)]
        interactive: bool,
    },

    /// List stored sessions
    Sessions,

    /// Print (or write) a session's plan as an .ics calendar
    ExportIcs {
        session_id: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Paste an OpenAI API key (stored in ~/.slotwise/auth.json)
    PasteOpenaiApiKey,

    /// Paste an Anthropic token (stored in ~/.slotwise/auth.json)
    PasteAnthropicToken,

    /// Connect Google Calendar through OAuth
    #[cfg(feature = "gcal")]
    ConnectGoogle,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum WriteTarget {
    Ics,
    Gcalcli,
    Google,
    None,
}

impl WriteTarget {
    fn from_config(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| anyhow::anyhow!("unknown [calendar].write '{s}' (expected ics, gcalcli, google, none)"))
    }
}

type CliOrchestrator = Orchestrator<
    Box<dyn Decomposer>,
    Box<dyn CalendarReader>,
    Box<dyn CalendarWriter>,
    Box<dyn DecisionOracle>,
>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slotwise=info,slotwise_core=info,hyper=warn,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig => config::init_config()?,

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
            AuthCommand::PasteAnthropicToken => auth::anthropic_paste_token()?,
            #[cfg(feature = "gcal")]
            AuthCommand::ConnectGoogle => google_calendar::connect_interactive().await?,
        },

        Command::Plan {
            text,
            tasks,
            calendar,
            write,
            interactive,
            horizon_days,
        } => {
            let cfg = config::load_config()?;
            let mut preferences = cfg.preferences.clone();
            if let Some(days) = horizon_days {
                preferences.horizon_days = days;
            }
            let raw_input = text.unwrap_or_default();
            if raw_input.trim().is_empty() && tasks.is_none() {
                bail!("nothing to plan: pass a description or --tasks <file>");
            }

            let decomposer = build_decomposer(&cfg, tasks)?;
            let orch = build_orchestrator(&cfg, decomposer, calendar, write, interactive)?;
            let result = orch.run_session(&cfg.scheduling.user_id, &raw_input, preferences);
            print_result(&result, &cfg, cli.json)?;
        }

        Command::Feedback {
            session_id,
            drop,
            duration,
            priority,
            constraint,
            clear_constraints,
            deadline,
            work_start,
            work_end,
            lunch,
            no_lunch,
            horizon_days,
            note,
            calendar,
            write,
            interactive,
        } => {
            let cfg = config::load_config()?;
            let mut feedback = Feedback {
                note,
                ..Feedback::default()
            };
            for task_id in drop {
                feedback.adjustments.push(TaskAdjustment::Drop { task_id });
            }
            for s in &duration {
                let (id, v) = prompt::split_assignment(s)?;
                let minutes = v
                    .parse()
                    .with_context(|| format!("--duration {s}: minutes must be a whole number"))?;
                feedback.adjustments.push(TaskAdjustment::SetDuration {
                    task_id: id.to_string(),
                    minutes,
                });
            }
            for s in &priority {
                let (id, v) = prompt::split_assignment(s)?;
                let priority = v
                    .parse()
                    .with_context(|| format!("--priority {s}: expected a number"))?;
                feedback.adjustments.push(TaskAdjustment::SetPriority {
                    task_id: id.to_string(),
                    priority,
                });
            }
            for task_id in clear_constraints {
                feedback
                    .adjustments
                    .push(TaskAdjustment::ClearConstraints { task_id });
            }
            for s in &constraint {
                let (id, v) = prompt::split_assignment(s)?;
                feedback.adjustments.push(TaskAdjustment::AddConstraint {
                    task_id: id.to_string(),
                    constraint: v.to_string(),
                });
            }
            for s in &deadline {
                let (id, v) = prompt::split_assignment(s)?;
                let deadline = match v {
                    "none" | "" => None,
                    v => Some(
                        slotwise_core::decompose::parse_deadline(v)
                            .with_context(|| format!("--deadline {s}"))?,
                    ),
                };
                feedback.adjustments.push(TaskAdjustment::SetDeadline {
                    task_id: id.to_string(),
                    deadline,
                });
            }
            feedback.preferences = PreferenceOverrides {
                work_hours_start: parse_clock_flag("--work-start", work_start.as_deref())?,
                work_hours_end: parse_clock_flag("--work-end", work_end.as_deref())?,
                lunch_start: parse_clock_flag("--lunch", lunch.as_deref())?,
                skip_lunch: no_lunch,
                horizon_days,
                break_minutes: None,
            };
            if feedback.is_empty() {
                bail!("no adjustments given; see slotwise feedback --help");
            }

            let orch = build_orchestrator(
                &cfg,
                Box::new(StaticDecomposer::default()),
                calendar,
                write,
                interactive,
            )?;
            let result = orch
                .submit_feedback(&session_id, feedback)
                .with_context(|| format!("resume session {session_id}"))?;
            print_result(&result, &cfg, cli.json)?;
        }

        Command::Sessions => {
            let store = FileSessionStore::open_default()?;
            let ids = store.list()?;
            if ids.is_empty() {
                println!("No sessions yet. Run: slotwise plan \"...\"");
            }
            for id in ids {
                let Some(s) = store.load(&id)? else {
                    continue;
                };
                let outcome = SessionResult::from(&s).outcome;
                println!(
                    "{}  {:<16} updated {}  tasks={} placed={} conflicts={}{}",
                    s.session_id,
                    format!("{outcome:?}"),
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                    s.tasks.len(),
                    s.plan.len(),
                    s.conflicts.len(),
                    if s.awaiting_user_input { "  (awaiting feedback)" } else { "" },
                );
            }
        }

        Command::ExportIcs { session_id, out } => {
            let cfg = config::load_config()?;
            let store = FileSessionStore::open_default()?;
            let state = store
                .load(&session_id)?
                .with_context(|| format!("unknown session {session_id}"))?;
            let events = calendar::plan_to_events(&state.plan, cfg.timezone()?)?;
            let ics = calendar::events_to_ics(&events);
            match out {
                Some(p) => {
                    std::fs::write(&p, ics).with_context(|| format!("write {}", p.display()))?;
                    println!("Wrote {} event(s) to {}", events.len(), p.display());
                }
                None => print!("{ics}"),
            }
        }
    }

    Ok(())
}

fn parse_clock_flag(flag: &str, value: Option<&str>) -> Result<Option<chrono::NaiveTime>> {
    value
        .map(|v| {
            slotwise_core::time::parse_clock(v)
                .with_context(|| format!("{flag}: expected a time like 09:00 or 5pm, got '{v}'"))
        })
        .transpose()
}

fn llm_config(cfg: &Config) -> Result<Option<llm::LlmConfig>> {
    let auth = auth::load_auth()?;
    llm::LlmConfig::resolve(&cfg.llm, &auth)
}

fn build_decomposer(cfg: &Config, tasks: Option<PathBuf>) -> Result<Box<dyn Decomposer>> {
    if let Some(path) = tasks {
        let tasks = state::read_tasks_file(&path)?;
        tracing::info!(count = tasks.len(), file = %path.display(), "loaded tasks");
        return Ok(Box::new(StaticDecomposer::new(tasks)));
    }
    let Some(llm) = llm_config(cfg)? else {
        bail!(
            "no model credentials found. Run `slotwise auth paste-anthropic-token` or \
`slotwise auth paste-openai-api-key`, or pass --tasks <file>"
        );
    };
    let tz = cfg.timezone()?;
    Ok(Box::new(llm::LlmDecomposer::new(
        llm,
        time::now_local(tz),
        cfg.calendar.timezone.clone(),
    )))
}

fn build_orchestrator(
    cfg: &Config,
    decomposer: Box<dyn Decomposer>,
    calendar_file: Option<PathBuf>,
    write: Option<WriteTarget>,
    interactive: bool,
) -> Result<CliOrchestrator> {
    let tz = cfg.timezone()?;

    let reader: Box<dyn CalendarReader> = match calendar_file {
        Some(path) => Box::new(StaticCalendar::new(state::read_calendar_file(&path)?)),
        None => build_default_reader(cfg, tz)?,
    };

    let target = match write {
        Some(t) => t,
        None => WriteTarget::from_config(&cfg.calendar.write)?,
    };
    let writer: Box<dyn CalendarWriter> = match target {
        WriteTarget::Ics => Box::new(calendar::IcsFileWriter::new(cfg.ics_path()?, tz)),
        WriteTarget::Gcalcli => Box::new(calendar::GcalcliWriter::new(
            cfg.calendar.gcalcli_calendar.clone(),
            tz,
        )?),
        WriteTarget::Google => build_google_writer(cfg, tz)?,
        WriteTarget::None => Box::new(DryRunWriter),
    };

    let oracle: Box<dyn DecisionOracle> = match llm_config(cfg)? {
        Some(llm) if cfg.llm.use_oracle => Box::new(llm::LlmOracle::new(llm)),
        _ => Box::new(HeuristicOracle),
    };

    let mut orch_cfg = cfg.orchestrator_config();
    orch_cfg.fixed_now = Some(time::now_local(tz));

    let mut orch = Orchestrator::new(decomposer, reader, writer, oracle)
        .with_config(orch_cfg)
        .with_session_store(FileSessionStore::open_default()?);
    if interactive {
        orch = orch.with_feedback_source(prompt::StdinFeedback);
    }
    Ok(orch)
}

#[cfg(feature = "gcal")]
fn build_default_reader(cfg: &Config, tz: chrono_tz::Tz) -> Result<Box<dyn CalendarReader>> {
    if cfg.calendar.read_google {
        return Ok(Box::new(google_calendar::GoogleCalendar::connect(
            cfg.calendar.google_calendar_id.clone(),
            tz,
        )?));
    }
    tracing::warn!("no --calendar file given; planning against an empty calendar");
    Ok(Box::new(StaticCalendar::default()))
}

#[cfg(not(feature = "gcal"))]
fn build_default_reader(cfg: &Config, _tz: chrono_tz::Tz) -> Result<Box<dyn CalendarReader>> {
    if cfg.calendar.read_google {
        bail!("[calendar].read_google needs a build with --features gcal");
    }
    tracing::warn!("no --calendar file given; planning against an empty calendar");
    Ok(Box::new(StaticCalendar::default()))
}

#[cfg(feature = "gcal")]
fn build_google_writer(cfg: &Config, tz: chrono_tz::Tz) -> Result<Box<dyn CalendarWriter>> {
    Ok(Box::new(google_calendar::GoogleCalendar::connect(
        cfg.calendar.google_calendar_id.clone(),
        tz,
    )?))
}

#[cfg(not(feature = "gcal"))]
fn build_google_writer(_cfg: &Config, _tz: chrono_tz::Tz) -> Result<Box<dyn CalendarWriter>> {
    bail!("--write google needs a build with --features gcal; try --write ics or --write gcalcli")
}

fn print_result(result: &SessionResult, cfg: &Config, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("Session {}: {:?}", result.session_id, result.outcome);
    if !result.plan.is_empty() {
        println!("\nPlan ({}):", cfg.calendar.timezone);
        for item in &result.plan {
            println!(
                "  {} {}-{}  {}{}",
                item.start.format("%a %m-%d"),
                item.start.format("%H:%M"),
                item.end.format("%H:%M"),
                item.title,
                item.location
                    .as_deref()
                    .map(|l| format!(" @ {l}"))
                    .unwrap_or_default(),
            );
        }
    }
    if !result.conflicts.is_empty() {
        println!("\nCould not place:");
        for c in &result.conflicts {
            println!("  - {} [{}] {}", c.task_id, c.reason, c.suggestion);
        }
    }
    if !result.errors.is_empty() {
        println!("\nErrors:");
        for e in &result.errors {
            println!("  - {e}");
        }
    }
    if result.awaiting_user_input {
        println!(
            "\nWaiting for input. Example: slotwise feedback {} --duration <task>=<minutes>",
            result.session_id
        );
    }
    Ok(())
}

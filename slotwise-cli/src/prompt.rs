//! Terminal feedback: the `--interactive` prompt and the shared parser for
//! `task=value` style adjustments.

use anyhow::{anyhow, bail, Result};
use slotwise_core::decompose::parse_deadline;
use slotwise_core::{Feedback, FeedbackPrompt, FeedbackSource, TaskAdjustment};
use std::io::{self, BufRead, Write};

/// Split `id=value`.
pub fn split_assignment(s: &str) -> Result<(&str, &str)> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected <task-id>=<value>, got '{s}'"))?;
    let (id, value) = (id.trim(), value.trim());
    if id.is_empty() {
        bail!("missing task id in '{s}'");
    }
    Ok((id, value))
}

/// One line of interactive input, e.g. `duration t1 45` or `constraint t2 after 17:00`.
/// `Ok(None)` for blank lines.
pub fn parse_adjustment_line(line: &str) -> Result<Option<TaskAdjustment>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut parts = line.splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let task_id = parts
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing task id after '{verb}'"))?;
    let rest = parts.next().map(str::trim).unwrap_or("");

    let adj = match verb.as_str() {
        "drop" => TaskAdjustment::Drop { task_id },
        "duration" => TaskAdjustment::SetDuration {
            task_id,
            minutes: rest
                .parse()
                .map_err(|_| anyhow!("duration must be whole minutes, got '{rest}'"))?,
        },
        "priority" => TaskAdjustment::SetPriority {
            task_id,
            priority: rest
                .parse()
                .map_err(|_| anyhow!("priority must be a non-negative number, got '{rest}'"))?,
        },
        "constraint" => {
            if rest.is_empty() {
                bail!("constraint text is empty");
            }
            TaskAdjustment::AddConstraint {
                task_id,
                constraint: rest.to_string(),
            }
        }
        "clear" => TaskAdjustment::ClearConstraints { task_id },
        "deadline" => TaskAdjustment::SetDeadline {
            task_id,
            deadline: match rest {
                "" | "none" => None,
                s => Some(parse_deadline(s)?),
            },
        },
        other => bail!("unknown command '{other}'"),
    };
    Ok(Some(adj))
}

const HELP: &str = "  drop <id> | duration <id> <min> | priority <id> <n> | constraint <id> <text>
  clear <id> | deadline <id> <YYYY-MM-DD HH:MM|none> | (empty line) submit | park";

/// Reads adjustments from stdin until an empty line. `park` (or no input at
/// all) leaves the session waiting for `slotwise feedback`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinFeedback;

impl FeedbackSource for StdinFeedback {
    fn request_feedback(&self, prompt: &FeedbackPrompt<'_>) -> Option<Feedback> {
        println!(
            "\n{} task(s) could not be placed (attempt {}/{}):",
            prompt.conflicts.len(),
            prompt.retry_count,
            prompt.max_retries
        );
        for c in prompt.conflicts {
            println!("  - {} [{}] {}", c.task_id, c.reason, c.suggestion);
        }
        println!("Adjust tasks, one per line:\n{HELP}");

        let stdin = io::stdin();
        let mut feedback = Feedback::default();
        loop {
            print!("> ");
            io::stdout().flush().ok();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if line.trim().eq_ignore_ascii_case("park") {
                return None;
            }
            match parse_adjustment_line(&line) {
                Ok(Some(adj)) => feedback.adjustments.push(adj),
                Ok(None) => break,
                Err(e) => println!("  {e}"),
            }
        }
        if feedback.is_empty() { None } else { Some(feedback) }
    }
}

//! Decision Oracle seam: tie-breaking between near-equal candidate slots.
//!
//! Live implementations (LLM-backed) live outside the core. The selector
//! always has a deterministic path when the oracle errors.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::plan::SchedulingPlanItem;
use crate::task::Task;
use crate::time::TimeSlot;

/// A candidate slot with its heuristic score. Ordered best-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub slot: TimeSlot,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleChoice {
    pub index: usize,
    pub rationale: String,
}

/// Everything the oracle may look at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub task: &'a Task,
    pub candidates: &'a [RankedCandidate],
    pub already_placed: &'a [SchedulingPlanItem],
}

pub trait DecisionOracle: Send + Sync {
    fn rank(&self, request: &OracleRequest<'_>) -> Result<OracleChoice>;
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for Box<T> {
    fn rank(&self, request: &OracleRequest<'_>) -> Result<OracleChoice> {
        (**self).rank(request)
    }
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for std::sync::Arc<T> {
    fn rank(&self, request: &OracleRequest<'_>) -> Result<OracleChoice> {
        (**self).rank(request)
    }
}

/// Deterministic oracle: takes the best-ranked candidate (highest score,
/// then earliest start).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOracle;

impl DecisionOracle for HeuristicOracle {
    fn rank(&self, request: &OracleRequest<'_>) -> Result<OracleChoice> {
        if request.candidates.is_empty() {
            bail!("no candidates to rank");
        }
        Ok(OracleChoice {
            index: 0,
            rationale: HEURISTIC_RATIONALE.to_string(),
        })
    }
}

pub const HEURISTIC_RATIONALE: &str = "Heuristic choice: highest-scoring slot, earliest start first.";

/// Stable id shown to a language model: slot_a, slot_b, ...
pub fn slot_id(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    if index < 26 {
        format!("slot_{letter}")
    } else {
        format!("slot_{letter}{}", index / 26)
    }
}

/// JSON context for an LLM-backed oracle.
pub fn request_context(request: &OracleRequest<'_>) -> serde_json::Value {
    let candidates: Vec<_> = request
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({
                "id": slot_id(i),
                "start_time": c.slot.start,
                "end_time": c.slot.end,
                "score": c.score,
            })
        })
        .collect();
    let placed: Vec<_> = request
        .already_placed
        .iter()
        .map(|p| {
            json!({
                "title": p.title,
                "start_time": p.start,
                "end_time": p.end,
                "location": p.location,
                "category": p.category,
            })
        })
        .collect();
    json!({
        "task": request.task,
        "already_scheduled": placed,
        "candidate_slots": candidates,
    })
}

#[derive(Debug, Deserialize)]
struct OracleReply {
    best_slot_id: String,
    #[serde(default)]
    reasoning: String,
}

/// Parse `{"best_slot_id": "slot_b", "reasoning": "..."}`, tolerating code
/// fences. Out-of-range ids are errors.
pub fn parse_oracle_reply(text: &str, candidate_count: usize) -> Result<OracleChoice> {
    let body = crate::decompose::strip_code_fence(text);
    let reply: OracleReply = serde_json::from_str(body).context("parse oracle reply")?;
    let index = (0..candidate_count)
        .find(|i| slot_id(*i) == reply.best_slot_id.trim())
        .ok_or_else(|| anyhow!("oracle chose unknown slot '{}'", reply.best_slot_id))?;
    let rationale = if reply.reasoning.trim().is_empty() {
        "Chosen by decision oracle.".to_string()
    } else {
        reply.reasoning.trim().to_string()
    };
    Ok(OracleChoice { index, rationale })
}

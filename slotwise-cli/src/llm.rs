use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use slotwise_core::{
    parse_oracle_reply, parse_task_payload, request_context, DecisionOracle, Decomposer,
    OracleChoice, OracleRequest, Task,
};
use std::future::Future;
use std::time::Duration;

use crate::auth::{self, AuthState};
use crate::config::LlmSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Pick a provider from config and stored credentials. `None` when no
    /// model is configured or no credential is available.
    pub fn resolve(section: &LlmSection, auth: &AuthState) -> Result<Option<Self>> {
        let provider = match section.provider.to_ascii_lowercase().as_str() {
            "none" | "off" => return Ok(None),
            "anthropic" => Provider::Anthropic,
            "openai" => Provider::OpenAI,
            "auto" | "" => {
                if auth.anthropic_token.is_some() {
                    Provider::Anthropic
                } else if auth.openai_api_key.is_some() {
                    Provider::OpenAI
                } else {
                    return Ok(None);
                }
            }
            other => bail!("unknown llm provider '{other}' (expected auto, anthropic, openai, none)"),
        };
        let model = section.model.clone().unwrap_or_else(|| match provider {
            Provider::Anthropic => "claude-3-5-sonnet-latest".to_string(),
            Provider::OpenAI => "gpt-4o-mini".to_string(),
        });
        Ok(Some(Self {
            provider,
            model,
            temperature: section.temperature,
            timeout: Duration::from_secs(section.timeout_secs.max(1)),
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Run a future to completion from sync code, whether or not a tokio
/// runtime is already running on this thread.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
    } else {
        let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
        Ok(rt.block_on(fut))
    }
}

pub fn chat_complete(config: &LlmConfig, system: &str, turns: &[ChatTurn]) -> Result<String> {
    block_on(chat_complete_async(config, system, turns))?
}

async fn chat_complete_async(config: &LlmConfig, system: &str, turns: &[ChatTurn]) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("build http client")?;
    match config.provider {
        Provider::Anthropic => anthropic_complete(&client, config, system, turns).await,
        Provider::OpenAI => openai_complete(&client, config, system, turns).await,
    }
}

async fn anthropic_complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    system: &str,
    turns: &[ChatTurn],
) -> Result<String> {
    let token = auth::load_auth()?
        .anthropic_token
        .ok_or_else(|| anyhow!("missing anthropic_token; run: slotwise auth paste-anthropic-token"))?;

    #[derive(Serialize)]
    struct Req<'a> {
        model: &'a str,
        max_tokens: i32,
        temperature: f32,
        system: &'a str,
        messages: &'a [ChatTurn],
    }

    #[derive(Deserialize)]
    struct Resp {
        content: Vec<ContentBlock>,
    }

    #[derive(Deserialize)]
    struct ContentBlock {
        #[serde(rename = "type")]
        t: String,
        text: Option<String>,
    }

    let body = Req {
        model: &config.model,
        max_tokens: 2048,
        temperature: config.temperature,
        system,
        messages: turns,
    };

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_str(&token)?);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let resp = client
        .post("https://api.anthropic.com/v1/messages")
        .headers(headers)
        .json(&body)
        .send()
        .await
        .context("anthropic request")?;

    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        bail!("anthropic error: {status} {txt}");
    }

    let out: Resp = resp.json().await.context("parse anthropic response")?;
    let text: String = out
        .content
        .into_iter()
        .filter(|b| b.t == "text")
        .filter_map(|b| b.text)
        .collect();
    Ok(text.trim().to_string())
}

async fn openai_complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    system: &str,
    turns: &[ChatTurn],
) -> Result<String> {
    let key = auth::load_auth()?
        .openai_api_key
        .ok_or_else(|| anyhow!("missing openai_api_key; run: slotwise auth paste-openai-api-key"))?;

    #[derive(Serialize)]
    struct Req<'a> {
        model: &'a str,
        messages: Vec<ChatTurn>,
        temperature: f32,
        response_format: serde_json::Value,
    }

    #[derive(Deserialize)]
    struct Resp {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: MsgOut,
    }

    #[derive(Deserialize)]
    struct MsgOut {
        content: Option<String>,
    }

    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatTurn {
        role: "system".to_string(),
        content: system.to_string(),
    });
    messages.extend(turns.iter().cloned());

    let body = Req {
        model: &config.model,
        messages,
        temperature: config.temperature,
        response_format: serde_json::json!({ "type": "json_object" }),
    };

    let resp = client
        .post("https://api.openai.com/v1/chat/completions")
        .header(AUTHORIZATION, format!("Bearer {key}"))
        .json(&body)
        .send()
        .await
        .context("openai request")?;

    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        bail!("openai error: {status} {txt}");
    }

    let out: Resp = resp.json().await.context("parse openai response")?;
    let content = out
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    Ok(content.trim().to_string())
}

const DECOMPOSE_SYSTEM: &str = r#"You turn a person's description of their day into schedulable tasks.
Reply with JSON only, no prose, in exactly this shape:
{"tasks": [{"title": string, "kind": "activity"|"travel", "duration_minutes": integer,
  "priority": "high"|"medium"|"low", "constraints": [string], "deadline": "YYYY-MM-DDTHH:MM" or null,
  "location": string or null, "category": string or null, "energy": "low"|"medium"|"high" or null,
  "contacts": [string], "notes": string, "confidence": number between 0 and 1}]}
Constraints are short hints such as "at 14:00", "after 17:00", "before EOD", "morning", "tomorrow".
Use categories like "work", "exercise", "errand", "social". Estimate durations realistically."#;

/// Decomposition through a chat model.
pub struct LlmDecomposer {
    config: LlmConfig,
    now: NaiveDateTime,
    timezone: String,
}

impl LlmDecomposer {
    pub fn new(config: LlmConfig, now: NaiveDateTime, timezone: impl Into<String>) -> Self {
        Self {
            config,
            now,
            timezone: timezone.into(),
        }
    }

    fn user_message(&self, raw_input: &str) -> String {
        format!(
            "Current local time: {} ({}, {}).\n\n{}",
            self.now.format("%Y-%m-%dT%H:%M"),
            self.now.format("%A"),
            self.timezone,
            raw_input.trim()
        )
    }
}

impl Decomposer for LlmDecomposer {
    fn decompose(&self, raw_input: &str) -> Result<Vec<Task>> {
        if raw_input.trim().is_empty() {
            bail!("nothing to plan: input is empty");
        }
        let reply = chat_complete(
            &self.config,
            DECOMPOSE_SYSTEM,
            &[ChatTurn::user(self.user_message(raw_input))],
        )?;
        tracing::debug!(chars = reply.len(), "decomposition reply");
        parse_task_payload(&reply)
    }
}

const ORACLE_SYSTEM: &str = r#"You pick the best time slot for one task among equally scored candidates.
Consider what is already scheduled (travel between locations, grouping similar work, energy).
Reply with JSON only: {"best_slot_id": "<id from candidate_slots>", "reasoning": "<one sentence>"}"#;

/// Tie-breaking through a chat model. Any failure falls back in the selector.
pub struct LlmOracle {
    config: LlmConfig,
}

impl LlmOracle {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl DecisionOracle for LlmOracle {
    fn rank(&self, request: &OracleRequest<'_>) -> Result<OracleChoice> {
        let context = serde_json::to_string_pretty(&request_context(request))?;
        let reply = chat_complete(&self.config, ORACLE_SYSTEM, &[ChatTurn::user(context)])?;
        parse_oracle_reply(&reply, request.candidates.len())
    }
}

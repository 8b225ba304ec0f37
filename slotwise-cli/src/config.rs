use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use slotwise_core::{OrchestratorConfig, Preferences};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::ensure_slotwise_home;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub scheduling: SchedulingSection,
    pub calendar: CalendarSection,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "auto" (whichever credential is stored), "anthropic", "openai", or "none".
    pub provider: String,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Ask the model to break ties between equally scored slots.
    pub use_oracle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingSection {
    pub user_id: String,
    pub max_retries: u32,
    pub session_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    /// IANA timezone the plan is expressed in.
    pub timezone: String,
    /// Default writer: "ics", "gcalcli", "google", or "none".
    pub write: String,
    /// Output file for the ics writer. Defaults to ~/.slotwise/plan.ics.
    pub ics_path: Option<PathBuf>,
    /// Target calendar for gcalcli.
    pub gcalcli_calendar: Option<String>,
    /// Calendar id for the Google API (feature `gcal`).
    pub google_calendar_id: String,
    /// Read busy time from Google Calendar when no --calendar file is given.
    pub read_google: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            temperature: 0.2,
            timeout_secs: 30,
            use_oracle: true,
        }
    }
}

impl Default for SchedulingSection {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            max_retries: slotwise_core::DEFAULT_MAX_RETRIES,
            session_timeout_secs: 120,
        }
    }
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            write: "ics".to_string(),
            ics_path: None,
            gcalcli_calendar: None,
            google_calendar_id: "primary".to_string(),
            read_google: false,
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        crate::time::parse_tz(&self.calendar.timezone)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: self.scheduling.max_retries,
            session_timeout: match self.scheduling.session_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            fixed_now: None,
        }
    }

    pub fn ics_path(&self) -> Result<PathBuf> {
        match &self.calendar.ics_path {
            Some(p) => Ok(p.clone()),
            None => Ok(ensure_slotwise_home()?.join("plan.ics")),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_slotwise_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
    cfg.preferences
        .validate()
        .map_err(|e| anyhow::anyhow!("{}: [preferences] {e}", p.display()))?;
    Ok(cfg)
}

pub fn save_config_to(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config_to(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        save_config_to(&Config::default(), &p).unwrap();
        let back = load_config_from(&p).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(
            &p,
            "[scheduling]\nmax_retries = 1\n\n[preferences]\nwork_hours_start = \"08:00:00\"\nhorizon_days = 2\n",
        )
        .unwrap();
        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.scheduling.max_retries, 1);
        assert_eq!(cfg.scheduling.session_timeout_secs, 120);
        assert_eq!(cfg.preferences.horizon_days, 2);
        assert_eq!(cfg.preferences.work_hours_start.to_string(), "08:00:00");
        assert_eq!(cfg.calendar.timezone, "America/Chicago");
    }

    #[test]
    fn invalid_preferences_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(&p, "[preferences]\nslot_granularity_minutes = 7\n").unwrap();
        assert!(load_config_from(&p).is_err());
    }

    #[test]
    fn zero_timeout_disables_budget() {
        let mut cfg = Config::default();
        cfg.scheduling.session_timeout_secs = 0;
        assert_eq!(cfg.orchestrator_config().session_timeout, None);
    }
}

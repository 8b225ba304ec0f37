use anyhow::{Context, Result};
use slotwise_core::collaborators::mark_claimed;
use slotwise_core::{parse_task_payload, CalendarEvent, ExecutionState, SessionError, SessionStore, Task};
use std::fs;
use std::path::{Path, PathBuf};

/// `$SLOTWISE_HOME`, or `~/.slotwise`.
pub fn slotwise_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SLOTWISE_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".slotwise"))
}

pub fn ensure_slotwise_home() -> Result<PathBuf> {
    let dir = slotwise_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn sessions_dir() -> Result<PathBuf> {
    Ok(ensure_slotwise_home()?.join("sessions"))
}

/// One JSON file per session under `dir`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn open_default() -> Result<Self> {
        Self::new(sessions_dir()?)
    }

    fn path(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        let safe = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

fn store_err(what: &str, path: &Path, e: impl std::fmt::Display) -> SessionError {
    SessionError::Store(format!("{what} {}: {e}", path.display()))
}

impl SessionStore for FileSessionStore {
    fn save(&self, state: &ExecutionState) -> Result<(), SessionError> {
        let p = self.path(&state.session_id)?;
        let json = serde_json::to_string_pretty(state).map_err(|e| store_err("serialize", &p, e))?;
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| store_err("write", &tmp, e))?;
        fs::rename(&tmp, &p).map_err(|e| store_err("rename", &p, e))?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<ExecutionState>, SessionError> {
        let p = self.path(session_id)?;
        if !p.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&p).map_err(|e| store_err("read", &p, e))?;
        let state = serde_json::from_str(&s).map_err(|e| store_err("parse", &p, e))?;
        Ok(Some(state))
    }

    fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        let p = self.path(session_id)?;
        if p.exists() {
            fs::remove_file(&p).map_err(|e| store_err("remove", &p, e))?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, SessionError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| store_err("list", &self.dir, e))?;
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == "json"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// A `<id>.lock` file created with `create_new` serializes claims across
    /// processes; whoever loses the race sees `NotAwaitingInput`.
    fn claim(&self, session_id: &str) -> Result<ExecutionState, SessionError> {
        let p = self.path(session_id)?;
        let lock = p.with_extension("lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SessionError::NotAwaitingInput(session_id.to_string()));
            }
            Err(e) => return Err(store_err("lock", &lock, e)),
        }

        let claimed = self
            .load(session_id)
            .and_then(|s| s.ok_or_else(|| SessionError::UnknownSession(session_id.to_string())))
            .and_then(|mut state| {
                mark_claimed(&mut state)?;
                self.save(&state)?;
                Ok(state)
            });
        if let Err(e) = fs::remove_file(&lock) {
            tracing::warn!(file = %lock.display(), error = %e, "could not remove session lock");
        }
        claimed
    }
}

/// A JSON array of events in local time:
/// `[{"summary": "Standup", "start": "2026-03-02T09:00:00", "end": "...", "is_movable": false}]`
pub fn read_calendar_file(path: &Path) -> Result<Vec<CalendarEvent>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse calendar {}", path.display()))
}

/// Same payload shape the language model returns: `{"tasks": [...]}`.
pub fn read_tasks_file(path: &Path) -> Result<Vec<Task>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_task_payload(&s).with_context(|| format!("parse tasks {}", path.display()))
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::state::ensure_slotwise_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub anthropic_token: Option<String>,
    pub openai_api_key: Option<String>,
}

fn auth_path() -> Result<std::path::PathBuf> {
    Ok(ensure_slotwise_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

fn check_anthropic_token(token: &str) -> Result<()> {
    if !token.starts_with("sk-ant-") {
        bail!("token didn't look like an Anthropic token (expected prefix sk-ant-)");
    }
    Ok(())
}

fn check_openai_key(key: &str) -> Result<()> {
    if !key.starts_with("sk-") || key.starts_with("sk-ant-") {
        bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
    }
    Ok(())
}

pub fn anthropic_paste_token() -> Result<()> {
    let mut auth = load_auth()?;
    let token = prompt_secret("Paste Anthropic token (starts with sk-ant-)")?;
    check_anthropic_token(&token)?;
    auth.anthropic_token = Some(token);
    save_auth(&auth)?;
    println!("Saved Anthropic token to {}", auth_path()?.display());
    Ok(())
}

pub fn openai_paste_api_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
    check_openai_key(&key)?;
    auth.openai_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved OpenAI API key to {}", auth_path()?.display());
    Ok(())
}

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::CalendarHub;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use serde::{Deserialize, Serialize};
use slotwise_core::{CalendarEvent, CalendarReader, CalendarWriter, SchedulingPlanItem};
use std::fs;
use std::path::PathBuf;

use crate::llm::block_on;
use crate::state::ensure_slotwise_home;
use crate::time::{local_to_utc, utc_to_local};

// Use the oauth2 version re-exported by google-calendar3.
use google_calendar3::oauth2;

type Hub = CalendarHub<HttpsConnector<HttpConnector>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
}

fn oauth_client_path() -> Result<PathBuf> {
    Ok(ensure_slotwise_home()?.join("google_oauth.json"))
}

fn token_cache_path() -> Result<PathBuf> {
    Ok(ensure_slotwise_home()?.join("google_token_cache.json"))
}

pub fn load_oauth_client() -> Result<GoogleOAuthClient> {
    let p = oauth_client_path()?;
    if !p.exists() {
        bail!(
            "Missing Google OAuth client config at {}. Run: slotwise auth connect-google",
            p.display()
        );
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(serde_json::from_str(&s)?)
}

/// Paste Desktop-app OAuth credentials, run the installed-app flow once, and
/// cache tokens under the slotwise home.
pub async fn connect_interactive() -> Result<()> {
    println!("Google Calendar connect\n");
    println!("Create OAuth credentials once at https://console.cloud.google.com/apis/credentials");
    println!("(OAuth client ID, application type: Desktop app), then paste them here.\n");

    let client_id = prompt("Paste client_id")?;
    let client_secret = prompt("Paste client_secret")?;
    if !client_id.contains('.') || client_secret.len() < 10 {
        bail!("client_id/client_secret didn't look valid");
    }

    let client = GoogleOAuthClient {
        client_id,
        client_secret,
        auth_uri: None,
        token_uri: None,
        redirect_uris: None,
    };
    let p = oauth_client_path()?;
    fs::write(&p, serde_json::to_string_pretty(&client)?)
        .with_context(|| format!("write {}", p.display()))?;

    let _hub = hub_from_client(&client).await?;
    println!("\nConnected. Tokens cached at: {}", token_cache_path()?.display());
    Ok(())
}

async fn hub_from_client(client: &GoogleOAuthClient) -> Result<Hub> {
    let installed = oauth2::ApplicationSecret {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        auth_uri: client
            .auth_uri
            .clone()
            .unwrap_or_else(|| "https://accounts.google.com/o/oauth2/auth".to_string()),
        token_uri: client
            .token_uri
            .clone()
            .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
        redirect_uris: client
            .redirect_uris
            .clone()
            .unwrap_or_else(|| vec!["http://localhost".to_string()]),
        ..Default::default()
    };

    let auth = oauth2::InstalledFlowAuthenticator::builder(
        installed,
        oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path()?)
    .build()
    .await
    .context("building oauth authenticator")?;

    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Ok(CalendarHub::new(hyper::Client::builder().build(connector), auth))
}

fn prompt(label: &str) -> Result<String> {
    use std::io::{self, Write};
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

/// Busy time and event creation through the Calendar API.
pub struct GoogleCalendar {
    hub: Hub,
    calendar_id: String,
    tz: Tz,
}

impl GoogleCalendar {
    pub fn connect(calendar_id: impl Into<String>, tz: Tz) -> Result<Self> {
        let client = load_oauth_client()?;
        let hub = block_on(hub_from_client(&client))??;
        Ok(Self {
            hub,
            calendar_id: calendar_id.into(),
            tz,
        })
    }

    /// All-day events carry only a date; their end date is exclusive, so
    /// midnight works for both ends.
    fn to_local(&self, dt: &EventDateTime) -> Option<NaiveDateTime> {
        match dt.date_time {
            Some(utc) => Some(utc_to_local(utc, self.tz)),
            None => dt.date.map(|d| d.and_time(NaiveTime::MIN)),
        }
    }
}

impl CalendarReader for GoogleCalendar {
    fn list_events(
        &self,
        _user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>> {
        let time_min = local_to_utc(start, self.tz)?;
        let time_max = local_to_utc(end, self.tz)?;
        let (_, events) = block_on(
            self.hub
                .events()
                .list(&self.calendar_id)
                .time_min(time_min)
                .time_max(time_max)
                .single_events(true)
                .order_by("startTime")
                .doit(),
        )?
        .context("listing google calendar events")?;

        let mut out = Vec::new();
        for ev in events.items.unwrap_or_default() {
            if ev.transparency.as_deref() == Some("transparent")
                || ev.status.as_deref() == Some("cancelled")
            {
                continue;
            }
            let (Some(s), Some(e)) = (
                ev.start.as_ref().and_then(|d| self.to_local(d)),
                ev.end.as_ref().and_then(|d| self.to_local(d)),
            ) else {
                continue;
            };
            if e <= s {
                tracing::debug!(summary = ?ev.summary, "skipping zero-length event");
                continue;
            }
            out.push(CalendarEvent::new(ev.summary.unwrap_or_default(), s, e));
        }
        tracing::info!(count = out.len(), "read google calendar events");
        Ok(out)
    }
}

impl CalendarWriter for GoogleCalendar {
    fn create_event(&self, _user_id: &str, item: &SchedulingPlanItem) -> Result<String> {
        let ev = Event {
            summary: Some(item.title.clone()),
            description: Some(format!("Task: {}\n{}", item.task_id, item.rationale)),
            location: item.location.clone(),
            start: Some(EventDateTime {
                date_time: Some(local_to_utc(item.start, self.tz)?),
                time_zone: Some(self.tz.name().to_string()),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(local_to_utc(item.end, self.tz)?),
                time_zone: Some(self.tz.name().to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, created) = block_on(self.hub.events().insert(ev, &self.calendar_id).doit())?
            .with_context(|| format!("inserting event '{}'", item.title))?;
        Ok(created.id.unwrap_or_default())
    }
}

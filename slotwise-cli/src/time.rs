//! Timezone edges: the core plans in naive local time, the outside world
//! speaks UTC.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub fn parse_tz(tz: &str) -> Result<Tz> {
    tz.parse().map_err(|_| anyhow!("invalid timezone: {tz}"))
}

/// Local wall time in `tz` to UTC. Ambiguous times (DST fall-back) take
/// the earlier instant; skipped times (spring-forward) are errors.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    let dt = tz
        .from_local_datetime(&local)
        .earliest()
        .ok_or_else(|| anyhow!("local time {local} does not exist in {tz} (DST gap)"))?;
    Ok(dt.with_timezone(&Utc))
}

pub fn utc_to_local(utc: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    utc.with_timezone(&tz).naive_local()
}

pub fn now_local(tz: Tz) -> NaiveDateTime {
    utc_to_local(Utc::now(), tz)
}

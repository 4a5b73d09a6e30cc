use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::config::ConfigError;

pub const DEADLINE_FORMAT: &str = "YYYY-MM-DD-HH";

/// Parse a `YYYY-MM-DD-HH` deadline into a naive (wall clock) timestamp.
pub fn parse_deadline(raw: &str) -> Result<NaiveDateTime, ConfigError> {
    let invalid = || ConfigError::InvalidDeadline(raw.to_string());

    let (date, hour) = raw.trim().rsplit_once('-').ok_or_else(invalid)?;
    if hour.len() != 2 || date.len() != 10 {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    date.and_hms_opt(hour, 0, 0).ok_or_else(invalid)
}

/// Interpret a wall-clock deadline in the local time zone.
pub fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>, ConfigError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ConfigError::InvalidDeadline(naive.format("%Y-%m-%d-%H").to_string()))
}

/// The cutoff for a run: the given deadline, or now.
pub fn resolve_deadline(raw: Option<&str>) -> Result<DateTime<Utc>, ConfigError> {
    match raw {
        Some(raw) => local_to_utc(parse_deadline(raw)?),
        None => Ok(Utc::now()),
    }
}

//! Next-run-at computation for both schedule kinds (spec §4.5): a plain
//! interval duration, and a timezone-aware 5-field cron expression evaluated
//! with DST-correct minute-by-minute wall-clock projection.

use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid interval duration: {0}")]
    InvalidInterval(String),
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("no cron occurrence found within the search horizon")]
    NoOccurrenceFound,
}

/// Parses a duration string like `30s`, `5m`, `2h`, `1d` (spec §3 `interval.cron`).
pub fn parse_interval(spec: &str) -> Result<Duration, ScheduleError> {
    let spec = spec.trim();
    let (digits, unit) = spec.split_at(spec.len().saturating_sub(1));
    let amount: i64 = digits
        .parse()
        .map_err(|_| ScheduleError::InvalidInterval(spec.to_string()))?;
    match unit {
        "s" => Ok(Duration::seconds(amount)),
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        _ => Err(ScheduleError::InvalidInterval(spec.to_string())),
    }
}

/// Resolves an IANA timezone name, defaulting to UTC when unset (spec: "default local",
/// which for a server process we take to mean UTC absent an explicit name).
pub fn resolve_timezone(name: Option<&str>) -> Result<Tz, ScheduleError> {
    match name {
        None => Ok(Tz::UTC),
        Some(name) => Tz::from_str(name).map_err(|_| ScheduleError::UnknownTimezone(name.to_string())),
    }
}

/// Builds a `cron` crate schedule from a 5-field (minute hour dom month dow)
/// expression by prepending a `0` seconds field, since the crate's parser
/// expects six fields.
fn build_schedule(expr: &str) -> Result<cron::Schedule, ScheduleError> {
    let six_field = format!("0 {expr}");
    cron::Schedule::from_str(&six_field).map_err(|e| ScheduleError::InvalidCron(e.to_string()))
}

/// The next instant, strictly after `after`, whose wall clock in `tz` matches
/// `expr`. Iterates candidate minutes one at a time rather than delegating to
/// the `cron` crate's own DST handling, per spec §4.5:
/// - spring-forward gaps (wall-clock minute does not exist) are skipped;
/// - fall-back overlaps (wall-clock minute occurs twice) fire once, at the
///   first occurrence only.
pub fn next_cron_occurrence(expr: &str, tz: Tz, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = build_schedule(expr)?;
    let after_local = after.with_timezone(&tz);
    let mut candidate = after_local
        .naive_local()
        .with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .ok_or_else(|| ScheduleError::InvalidCron(expr.to_string()))?
        + Duration::minutes(1);

    // Five years of minutes is a generous search horizon; a schedule with no
    // occurrence in that span is almost certainly malformed (e.g. Feb 30th).
    const MAX_MINUTES: i64 = 60 * 24 * 366 * 5;
    for _ in 0..MAX_MINUTES {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(zoned) => {
                let utc = zoned.with_timezone(&Utc);
                if utc > after && schedule.includes(zoned) {
                    return Ok(utc);
                }
            }
            LocalResult::Ambiguous(earliest, _latest) => {
                let utc = earliest.with_timezone(&Utc);
                if utc > after && schedule.includes(earliest) {
                    return Ok(utc);
                }
            }
            LocalResult::None => {
                // Spring-forward gap: this wall-clock minute never happened.
            }
        }
        candidate += Duration::minutes(1);
    }
    Err(ScheduleError::NoOccurrenceFound)
}

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, ZipfluxError};

/// Accepts `now`, an RFC 3339 timestamp, or a duration meaning "that long ago".
pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if input.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                ZipfluxError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(ZipfluxError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ZipfluxError::Parse(format!("invalid duration {input}: {e}")))
}

/// Epoch milliseconds for `--end` style arguments.
pub fn parse_end_millis(input: &str) -> Result<i64> {
    Ok(parse_time_or_relative(input)?.timestamp_millis())
}

pub fn parse_lookback_millis(input: &str) -> Result<i64> {
    let duration = parse_duration_str(input)?;
    i64::try_from(duration.as_millis())
        .map_err(|_| ZipfluxError::Parse(format!("lookback out of range: {input}")))
}

/// Microseconds from a duration argument such as `150ms`; a bare integer is
/// already microseconds.
pub fn parse_micros(input: &str) -> Result<i64> {
    if let Ok(raw) = input.parse::<i64>() {
        return Ok(raw);
    }
    let duration = parse_duration_str(input)?;
    i64::try_from(duration.as_micros())
        .map_err(|_| ZipfluxError::Parse(format!("duration out of range: {input}")))
}

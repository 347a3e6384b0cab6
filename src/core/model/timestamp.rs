// src/core/model/timestamp.rs

//! Helpers for the UTC ISO-8601 "Zulu" timestamp format used everywhere a
//! time is persisted or compared.

use crate::core::errors::OtterError;
use chrono::{DateTime, SecondsFormat, Utc};

/// The minimum representable timestamp, used as an "older than anything" sentinel.
pub const MIN: &str = "0001-01-01T00:00:00.000000Z";

/// The current UTC time in ISO-8601 Zulu format, with microsecond precision.
pub fn now() -> String {
    to_zulu(Utc::now())
}

/// Formats a `DateTime<Utc>` as an ISO-8601 Zulu timestamp.
pub fn to_zulu(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an ISO-8601 Zulu timestamp back into a `DateTime<Utc>`.
pub fn from_zulu(timestamp: &str) -> Result<DateTime<Utc>, OtterError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OtterError::InvalidRequest(format!("invalid timestamp '{timestamp}': {e}")))
}

/// Seconds elapsed between a stored Zulu timestamp and `now`.
/// Negative when the stored timestamp lies in the future.
pub fn seconds_since(timestamp: &str, now: DateTime<Utc>) -> Result<f64, OtterError> {
    let then = from_zulu(timestamp)?;
    Ok((now - then).num_milliseconds() as f64 / 1000.0)
}

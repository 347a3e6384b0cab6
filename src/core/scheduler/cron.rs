// src/core/scheduler/cron.rs

//! Cron recurrence parsing for scheduled policies.

use crate::core::errors::OtterError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// The next occurrence of a five-field cron expression strictly after `now`.
pub fn next_cron_occurrence(
    expression: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, OtterError> {
    // Policies use classic five-field cron; the parser wants a leading
    // seconds field, pinned to zero so occurrences land on whole minutes.
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    let schedule = Schedule::from_str(&normalized)
        .map_err(|e| OtterError::InvalidRequest(format!("bad cron expression '{expression}': {e}")))?;
    schedule
        .after(&now)
        .next()
        .ok_or_else(|| OtterError::InvalidRequest(format!("cron '{expression}' has no future occurrence")))
}

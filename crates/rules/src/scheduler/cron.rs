//! Cron normalization, validation and due-check helpers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, RuleError};

/// Normalize an expression for the `cron` crate.
///
/// 5-field expressions (`min hour dom month dow`) get a `0` seconds field
/// prepended. Quartz-style `?` ("no specific value") becomes `*`.
pub(crate) fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim().replace('?', "*");
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", trimmed)
    } else {
        // Already 6- or 7-field; pass through.
        trimmed
    }
}

/// Parse a rule schedule, accepting 5-, 6- and 7-field forms.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron(expression)).map_err(|e| RuleError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Reject expressions that would never parse at tick time.
pub fn validate_schedule(expression: &str) -> Result<()> {
    parse_schedule(expression).map(|_| ())
}

/// Check if a cron schedule is due at `now`.
///
/// A rule is due if a scheduled fire time falls in `(last_run, now]`. If
/// `last_run` is `None`, any fire time within the past day counts.
pub(crate) fn is_cron_due(
    schedule: &Schedule,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));

    if let Some(next) = schedule.after(&check_from).next() {
        next <= now
    } else {
        false
    }
}

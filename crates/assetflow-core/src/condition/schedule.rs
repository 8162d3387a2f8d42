//! Cron schedule helpers for `updated_since_cron`.
//!
//! Five-field expressions get a leading `0` seconds field before parsing.

use crate::types::{AssetFlowError, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Parse a five- or six/seven-field cron expression.
pub fn parse_cron(expression: &str) -> Result<Schedule> {
    let field_count = expression.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| AssetFlowError::InvalidCron {
        schedule: expression.to_string(),
        reason: e.to_string(),
    })
}

/// The latest schedule boundary at or before `now`.
#[must_use]
pub fn previous_cron_boundary(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if schedule.includes(now) {
        return Some(now);
    }
    schedule.after(&now).next_back()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_expressions_are_accepted() {
        assert!(parse_cron("0 0 * * *").is_ok());
        assert!(parse_cron("0 0 0 * * *").is_ok());
        assert!(matches!(
            parse_cron("every day"),
            Err(AssetFlowError::InvalidCron { .. })
        ));
    }

    #[test]
    fn previous_boundary_is_latest_midnight() {
        let schedule = parse_cron("0 0 * * *").expect("parse");
        let now = Utc
            .with_ymd_and_hms(2024, 3, 10, 15, 30, 0)
            .single()
            .expect("time");
        let boundary = previous_cron_boundary(&schedule, now).expect("boundary");
        assert_eq!(
            boundary,
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0)
                .single()
                .expect("time")
        );
    }

    #[test]
    fn boundary_at_now_is_inclusive() {
        let schedule = parse_cron("0 * * * *").expect("parse");
        let now = Utc
            .with_ymd_and_hms(2024, 3, 10, 15, 0, 0)
            .single()
            .expect("time");
        assert_eq!(previous_cron_boundary(&schedule, now), Some(now));
    }
}

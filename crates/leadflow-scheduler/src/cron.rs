//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Field forms: *, */N, N, comma lists ("0,15,30,45")
//! Example: "0 8 * * 1" = every Monday at 8:00
//!
//! Deliberately small — no cron crate dependency.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Parse a cron expression and compute the next run time after `after`.
/// Returns None for invalid expressions or when nothing matches within the
/// search horizon (~60 days).
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        tracing::warn!(
            "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
            expression
        );
        return None;
    }

    let minutes = parse_field(parts[0], 0, 59)?;
    let hours = parse_field(parts[1], 0, 23)?;
    let doms = parse_field(parts[2], 1, 31)?;
    let months = parse_field(parts[3], 1, 12)?;
    let dows = parse_field(parts[4], 0, 6)?; // 0 = Sunday

    let mut candidate = (after + Duration::minutes(1))
        .with_second(0)
        .unwrap_or(after)
        .with_nanosecond(0)
        .unwrap_or(after);

    // Step by minute, skipping whole days that cannot match.
    for _ in 0..(60 * 24 * 60) {
        let day_ok = doms.contains(&candidate.day())
            && months.contains(&candidate.month())
            && dows.contains(&candidate.weekday().num_days_from_sunday());

        if !day_ok {
            candidate = (candidate + Duration::days(1))
                .with_hour(0)
                .and_then(|c| c.with_minute(0))
                .unwrap_or(candidate + Duration::days(1));
            continue;
        }

        if minutes.contains(&candidate.minute()) && hours.contains(&candidate.hour()) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// Parse a cron field into the list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N — every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "0,15,30,45"
    if field.contains(',') {
        let vals: Result<Vec<u32>, _> = field.split(',').map(|s| s.trim().parse()).collect();
        return vals
            .ok()
            .map(|v| v.into_iter().filter(|x| *x >= min && *x <= max).collect());
    }

    // Single number
    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max { Some(vec![n]) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every_hour() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = next_run_from_cron("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_specific_time() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap();
        let next = next_run_from_cron("0 8 * * *", after).unwrap();
        assert_eq!(next.hour(), 8);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.day(), 22);
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_weekday_schedule() {
        // 2026-02-22 is a Sunday; next Monday 9:00 is the 23rd
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap();
        let next = next_run_from_cron("0 9 * * 1", after).unwrap();
        assert_eq!(next.day(), 23);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn test_day_of_month() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap();
        let next = next_run_from_cron("30 6 1 * *", after).unwrap();
        assert_eq!(next.month(), 3);
        assert_eq!(next.day(), 1);
        assert_eq!(next.hour(), 6);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_from_cron("bad", after).is_none());
        assert!(next_run_from_cron("*/0 * * * *", after).is_none());
        assert!(next_run_from_cron("99 * * * *", after).is_none());
    }
}

use chrono::{DateTime, Duration, Utc};

/// Start of a lookback window of `hours` ending now.
pub fn hours_ago(hours: i64) -> DateTime<Utc> { since_hours(Utc::now(), hours) }

pub fn since_hours(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> { now - Duration::hours(hours.max(0)) }

/// Elapsed milliseconds as stored in fetch logs.
pub fn elapsed_ms(started: std::time::Instant) -> i64 { started.elapsed().as_millis().min(i64::MAX as u128) as i64 }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_start_is_hours_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        assert_eq!(since_hours(now, 24), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn negative_window_is_empty() {
        let now = Utc::now();
        assert_eq!(since_hours(now, -5), now);
    }
}

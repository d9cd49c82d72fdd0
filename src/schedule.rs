//! Wall-clock scheduling helpers for the binary's main loop.
//!
//! Cycles fire on clock boundaries that are multiples of the interval
//! within the UTC day (e.g. :00/:15/:30/:45 for 15 minutes); the daily
//! counter resets at UTC midnight.

use chrono::{DateTime, Duration, Timelike, Utc};

const SECS_PER_DAY: i64 = 86_400;

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(i64::from(now.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// Next aligned tick strictly after `now`.
///
/// Intervals that don't divide the day evenly restart at midnight.
pub fn next_aligned_tick(now: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let period = i64::from(interval_minutes.max(1)) * 60;
    let day_start = start_of_day(now);
    let elapsed = i64::from(now.num_seconds_from_midnight());

    let next = (elapsed / period + 1) * period;
    day_start + Duration::seconds(next.min(SECS_PER_DAY))
}

/// The next UTC midnight strictly after `now`.
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(now) + Duration::days(1)
}

/// Wall-clock delay from `now` until `target`, zero if already past.
pub fn delay_until(now: DateTime<Utc>, target: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

//! Scalar progress metrics: completion percentage, countdown days and decay.
//!
//! Percentages round half up, computed in integer arithmetic so the same
//! portfolio always yields the same number.

use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `round(part / whole * 100)`, capped at 100. Zero when `whole` is zero.
pub fn percentage(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    let whole = u64::from(whole);
    let rounded = (u64::from(part) * 100 + whole / 2) / whole;
    rounded.min(100) as u8
}

/// Completion rate of `total_vri` against the sum of branch caps.
pub fn completion_rate(total_vri: u32, max_possible_vri: u32) -> u8 {
    percentage(total_vri, max_possible_vri)
}

/// `clamp(100 − round(total / max * 100), 0, 100)`.
///
/// With nothing obtainable (`max_possible_vri == 0`) there is no progress to
/// offset the decay, so the level is 100.
pub fn decay_level(total_vri: u32, max_possible_vri: u32) -> u8 {
    if max_possible_vri == 0 {
        return 100;
    }
    100 - percentage(total_vri, max_possible_vri)
}

/// Whole days until `target`, rounded up and never negative.
pub fn days_until_target_at(target: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = target.signed_duration_since(now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    let days = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

pub fn days_until_target(target: DateTime<Utc>) -> u32 {
    days_until_target_at(target, Utc::now())
}

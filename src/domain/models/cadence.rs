//! Cadence arithmetic for report schedules.
//!
//! All functions are pure and operate in UTC. Results are aligned to the
//! anchor's hour:minute; seconds and sub-seconds are dropped.

use chrono::{DateTime, Duration, Months, Timelike, Utc};

use super::report_schedule::Frequency;

/// Lookback used to window the first run of an on-demand schedule.
pub const ON_DEMAND_LOOKBACK_DAYS: i64 = 30;

/// Seconds since the epoch of `9999-12-31T23:59:59Z`.
const NEVER_TIMESTAMP: i64 = 253_402_300_799;

/// The "never fires" sentinel.
///
/// This is the largest instant that still encodes as a fixed-width RFC 3339
/// string, so ordered comparisons in the store keep working.
pub fn never() -> DateTime<Utc> {
    DateTime::from_timestamp(NEVER_TIMESTAMP, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn is_never(instant: DateTime<Utc>) -> bool {
    instant >= never()
}

/// Drop seconds and sub-seconds.
pub fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(instant)
}

fn clamp(instant: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match instant {
        Some(t) if t < never() => t,
        _ => never(),
    }
}

/// Next cadence instant after `anchor`.
///
/// Month arithmetic keeps the day-of-month and clamps to the last day of a
/// shorter target month (Jan 31 + 1 month = Feb 28/29).
pub fn next(frequency: Frequency, anchor: DateTime<Utc>) -> DateTime<Utc> {
    if is_never(anchor) {
        return never();
    }
    let anchor = truncate_to_minute(anchor);
    let advanced = match frequency {
        Frequency::Daily => anchor.checked_add_signed(Duration::days(1)),
        Frequency::Weekly => anchor.checked_add_signed(Duration::days(7)),
        Frequency::Monthly => anchor.checked_add_months(Months::new(1)),
        Frequency::Quarterly => anchor.checked_add_months(Months::new(3)),
        Frequency::OnDemand => None,
    };
    clamp(advanced)
}

/// Previous cadence instant before `anchor`; the length of one reporting window.
///
/// On-demand schedules look back [`ON_DEMAND_LOOKBACK_DAYS`].
pub fn previous(frequency: Frequency, anchor: DateTime<Utc>) -> DateTime<Utc> {
    let back = match frequency {
        Frequency::Daily => anchor.checked_sub_signed(Duration::days(1)),
        Frequency::Weekly => anchor.checked_sub_signed(Duration::days(7)),
        Frequency::Monthly => anchor.checked_sub_months(Months::new(1)),
        Frequency::Quarterly => anchor.checked_sub_months(Months::new(3)),
        Frequency::OnDemand => anchor.checked_sub_signed(Duration::days(ON_DEMAND_LOOKBACK_DAYS)),
    };
    back.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Result of walking a cadence forward past `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastForward {
    /// Most recent cadence instant `<= now` (the starting instant if none later).
    pub last_missed: DateTime<Utc>,
    /// First cadence instant `> now`.
    pub next_future: DateTime<Utc>,
}

/// Walk the cadence from `from` until it passes `now`.
pub fn fast_forward(frequency: Frequency, from: DateTime<Utc>, now: DateTime<Utc>) -> FastForward {
    let mut last_missed = from;
    let mut upcoming = next(frequency, from);
    while upcoming <= now {
        last_missed = upcoming;
        upcoming = next(frequency, upcoming);
    }
    FastForward {
        last_missed,
        next_future: upcoming,
    }
}

/// First instant after `now` that stays on the phase of `previous_next_run`.
///
/// Used by resume and admin reset. Falls back to one cadence step from `now`
/// when there is no usable phase.
pub fn reanchor(
    frequency: Frequency,
    previous_next_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if frequency.is_on_demand() {
        return never();
    }
    match previous_next_run {
        Some(prev) if is_never(prev) => next(frequency, now),
        Some(prev) if prev > now => prev,
        Some(prev) => fast_forward(frequency, prev, now).next_future,
        None => next(frequency, now),
    }
}

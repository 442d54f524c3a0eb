//! Calendar-day arithmetic shared by the write-path guard and the expiry sweep.
//!
//! Both compare *days*, never instants: a maturity later today is not past,
//! whatever its clock time.

use chrono::NaiveDateTime;

/// Whole calendar days from `now`'s day to `target`'s day.
/// Negative when `target` falls on an earlier day.
pub fn days_between(now: NaiveDateTime, target: NaiveDateTime) -> i64 {
    (target.date() - now.date()).num_days()
}

/// True when `maturity` falls on a day strictly before `now`'s day.
pub fn is_before_today(now: NaiveDateTime, maturity: NaiveDateTime) -> bool {
    days_between(now, maturity) < 0
}

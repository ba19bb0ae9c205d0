//! Mapping between instants and per-agent calendar days.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar date of `ts` in the agent's time zone
pub fn local_date(ts: &DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// First instant whose local date is `date`.
///
/// Midnight can be skipped by a DST jump (e.g. America/Santiago), in which
/// case the day starts at the first local time that exists.
pub fn day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut candidate = date.and_time(NaiveTime::MIN);
    let end = candidate + Duration::hours(4);
    while candidate < end {
        if let Some(ts) = tz.from_local_datetime(&candidate).earliest() {
            return ts.with_timezone(&Utc);
        }
        candidate += Duration::minutes(15);
    }
    // No zone skips more than a few hours; treat the local clock as UTC.
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Half-open UTC interval `[start, end)` covering `date` in `tz`
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (day_start(date, tz), day_start(next, tz))
}

//! Zone clock: converts between a tenant's local wall-clock time and UTC.
//!
//! All instants in the system are `DateTime<Utc>`. Local components are only
//! derived at the edges (policy checks, parsing client input).

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;

use crate::error::ClockError;

/// Fallback zone for tenants that never configured one.
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

/// Local calendar and wall-clock components of an instant in some timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalParts {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
}

impl LocalParts {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Minutes elapsed since local midnight.
    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

/// Local components of `instant` as seen in `tz`.
pub fn local_parts(instant: DateTime<Utc>, tz: Tz) -> LocalParts {
    let local = instant.with_timezone(&tz);
    LocalParts {
        date: local.date_naive(),
        hour: local.hour(),
        minute: local.minute(),
        second: local.second(),
        weekday: local.weekday(),
    }
}

/// The UTC instant whose rendering in `tz` is `date time`.
///
/// A repeated local hour (DST fall-back) resolves to the earlier occurrence.
/// A skipped local hour (DST spring-forward) is read with the offset in force
/// before the transition, which lands just after the gap.
pub fn to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let wall = date.and_time(time);
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Transitions are months apart, so a day earlier is safely pre-gap.
            let before = tz
                .offset_from_utc_datetime(&(wall - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(wall - Duration::seconds(i64::from(before))))
        }
    }
}

/// Parse `YYYY-MM-DD` and `HH:MM` into naive local components.
pub fn parse_local(date: &str, time: &str) -> Result<(NaiveDate, NaiveTime), ClockError> {
    let d = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| ClockError::InvalidTimeInput(format!("date {date:?}: {e}")))?;
    let t = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|e| ClockError::InvalidTimeInput(format!("time {time:?}: {e}")))?;
    Ok((d, t))
}

/// Look up an IANA timezone by name.
pub fn parse_timezone(name: &str) -> Result<Tz, ClockError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ClockError::UnknownTimezone(name.to_string()))
}

/// Whole calendar months from `from` to `to`, ignoring the day of month.
///
/// 31 Jan → 1 Mar is two months; 1 Mar → 31 Mar is zero.
pub fn calendar_months_between(from: &LocalParts, to: &LocalParts) -> i32 {
    (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32)
}

//! Per-tenant availability policy and the pure legality check.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use slotwise_core::clock::{calendar_months_between, local_parts, parse_timezone, DEFAULT_TIMEZONE};
use tracing::warn;

use crate::error::Violation;

pub const MIN_SLOT_INTERVAL: u32 = 5;
pub const MAX_SLOT_INTERVAL: u32 = 240;
const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day in minutes since midnight, `00:00..=24:00`.
///
/// Serialized as `"HH:MM"`. `24:00` is only meaningful as a block end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(u16);

impl WallTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        let total = hour.checked_mul(60)?.checked_add(minute)?;
        (total <= u32::from(MINUTES_PER_DAY)).then_some(WallTime(total as u16))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<String> for WallTime {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for WallTime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {s:?}"))?;
        let hour: u32 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u32 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        WallTime::from_hm(hour, minute).ok_or_else(|| format!("time out of range: {s:?}"))
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> String {
        t.to_string()
    }
}

impl std::fmt::Display for WallTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Half-open `[start, end)` stretch of a working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start: WallTime,
    pub end: WallTime,
}

impl TimeBlock {
    pub fn new(start: WallTime, end: WallTime) -> Self {
        Self { start, end }
    }

    /// Whether `[start_min, end_min)` lies entirely inside this block.
    pub fn contains(&self, start_min: u32, end_min: u32) -> bool {
        self.start.minutes() <= start_min && end_min <= self.end.minutes()
    }
}

/// Working blocks per weekday. A day with no blocks is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyHours {
    #[serde(default)]
    pub monday: Vec<TimeBlock>,
    #[serde(default)]
    pub tuesday: Vec<TimeBlock>,
    #[serde(default)]
    pub wednesday: Vec<TimeBlock>,
    #[serde(default)]
    pub thursday: Vec<TimeBlock>,
    #[serde(default)]
    pub friday: Vec<TimeBlock>,
    #[serde(default)]
    pub saturday: Vec<TimeBlock>,
    #[serde(default)]
    pub sunday: Vec<TimeBlock>,
}

impl WeeklyHours {
    pub fn day(&self, weekday: Weekday) -> &[TimeBlock] {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut Vec<TimeBlock> {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Tenant-wide booking rules. Stored as one JSON document per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPolicy {
    /// IANA zone name. Every local check happens in this zone.
    pub timezone: String,
    #[serde(default)]
    pub working_blocks: WeeklyHours,
    #[serde(default)]
    pub closed_dates: BTreeSet<NaiveDate>,
    #[serde(default = "default_interval")]
    pub slot_interval_minutes: u32,
    /// Calendar-month booking horizon. Zero disables the check.
    #[serde(default)]
    pub max_months_ahead: u32,
    /// Concurrent appointments allowed at any instant.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_interval() -> u32 {
    30
}

fn default_capacity() -> u32 {
    1
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        AvailabilityPolicy::from_legacy(&LegacyHours::default(), DEFAULT_TIMEZONE)
    }
}

impl AvailabilityPolicy {
    /// The policy zone. Falls back to the default zone for unsanitized input.
    pub fn tz(&self) -> Tz {
        parse_timezone(&self.timezone).unwrap_or(chrono_tz::Europe::Madrid)
    }

    /// Repair a policy so every invariant holds.
    ///
    /// Unknown zones fall back to `default_timezone`, the interval is clamped
    /// to `5..=240`, capacity to at least one. Per day, empty blocks are
    /// dropped, the rest sorted, overlapping ones clipped to the previous
    /// end and touching ones merged.
    pub fn sanitize(mut self, default_timezone: &str) -> Self {
        if parse_timezone(&self.timezone).is_err() {
            warn!(
                timezone = %self.timezone,
                fallback = %default_timezone,
                "unknown policy timezone"
            );
            self.timezone = if parse_timezone(default_timezone).is_ok() {
                default_timezone.to_string()
            } else {
                DEFAULT_TIMEZONE.to_string()
            };
        }

        let interval = self
            .slot_interval_minutes
            .clamp(MIN_SLOT_INTERVAL, MAX_SLOT_INTERVAL);
        if interval != self.slot_interval_minutes {
            warn!(from = self.slot_interval_minutes, to = interval, "slot interval clamped");
            self.slot_interval_minutes = interval;
        }
        self.capacity = self.capacity.max(1);

        for weekday in WEEK {
            let blocks = self.working_blocks.day_mut(weekday);
            let before = blocks.len();
            normalize_blocks(blocks);
            if blocks.len() != before {
                warn!(?weekday, before, after = blocks.len(), "working blocks repaired");
            }
        }
        if !self.has_working_hours() {
            warn!(timezone = %self.timezone, "policy has no working blocks");
        }
        self
    }

    /// Build a policy from the older single-range settings shape.
    pub fn from_legacy(legacy: &LegacyHours, timezone: &str) -> Self {
        let mut working_blocks = WeeklyHours::default();
        let day_blocks = legacy.blocks();
        for weekday in legacy.weekdays() {
            *working_blocks.day_mut(weekday) = day_blocks.clone();
        }
        AvailabilityPolicy {
            timezone: timezone.to_string(),
            working_blocks,
            closed_dates: BTreeSet::new(),
            slot_interval_minutes: legacy.interval,
            max_months_ahead: legacy.max_months_ahead,
            capacity: legacy.staff_count,
        }
        .sanitize(timezone)
    }

    /// Whether any day of the week has a working block.
    pub fn has_working_hours(&self) -> bool {
        WEEK.iter().any(|d| !self.working_blocks.day(*d).is_empty())
    }
}

fn normalize_blocks(blocks: &mut Vec<TimeBlock>) {
    blocks.retain(|b| b.end > b.start);
    blocks.sort_by_key(|b| (b.start, b.end));
    let mut out: Vec<TimeBlock> = Vec::with_capacity(blocks.len());
    for block in blocks.drain(..) {
        match out.last_mut() {
            Some(prev) if block.start <= prev.end => prev.end = prev.end.max(block.end),
            _ => out.push(block),
        }
    }
    *blocks = out;
}

/// Older settings shape: one opening range per day with a lunch break,
/// the same on every working day. Hours are whole hours, local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub lunch_start: u32,
    pub lunch_end: u32,
    pub interval: u32,
    pub max_months_ahead: u32,
    /// Day numbers with 0 = Sunday .. 6 = Saturday.
    pub working_days: Vec<u32>,
    pub staff_count: u32,
}

impl Default for LegacyHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            lunch_start: 13,
            lunch_end: 15,
            interval: 30,
            max_months_ahead: 2,
            working_days: vec![1, 2, 3, 4, 5],
            staff_count: 1,
        }
    }
}

impl LegacyHours {
    fn weekdays(&self) -> Vec<Weekday> {
        self.working_days
            .iter()
            .filter_map(|d| match d {
                0 => Some(Weekday::Sun),
                1 => Some(Weekday::Mon),
                2 => Some(Weekday::Tue),
                3 => Some(Weekday::Wed),
                4 => Some(Weekday::Thu),
                5 => Some(Weekday::Fri),
                6 => Some(Weekday::Sat),
                _ => None,
            })
            .collect()
    }

    /// `[start, lunch_start)` and `[lunch_end, end)`, or one block when the
    /// lunch break is empty. Degenerate pieces are removed by `sanitize`.
    fn blocks(&self) -> Vec<TimeBlock> {
        let at = |h: u32| WallTime::from_hm(h.min(24), 0).unwrap_or(WallTime(MINUTES_PER_DAY));
        let (open, close) = (at(self.start_hour), at(self.end_hour));
        if self.lunch_start >= self.lunch_end {
            return vec![TimeBlock::new(open, close)];
        }
        let (lunch_from, lunch_to) = (at(self.lunch_start), at(self.lunch_end));
        vec![
            TimeBlock::new(open, lunch_from.min(close)),
            TimeBlock::new(lunch_to.max(open), close),
        ]
    }
}

/// Pure legality check of `[start, start + duration)` against `policy`,
/// excluding capacity. Checks run in order: horizon, closed date,
/// alignment, containment.
pub fn is_legal(
    policy: &AvailabilityPolicy,
    start: DateTime<Utc>,
    duration_minutes: u32,
    now: DateTime<Utc>,
) -> Result<(), Violation> {
    let tz = policy.tz();
    let local = local_parts(start, tz);

    if policy.max_months_ahead > 0 {
        let today = local_parts(now, tz);
        if calendar_months_between(&today, &local) > policy.max_months_ahead as i32 {
            return Err(Violation::TooFarAhead {
                max_months: policy.max_months_ahead,
            });
        }
    }

    if policy.closed_dates.contains(&local.date) {
        return Err(Violation::ClosedDate { date: local.date });
    }

    let interval = policy.slot_interval_minutes.max(1);
    let minute_of_day = local.minute_of_day();
    if local.second != 0 || start.nanosecond() != 0 || minute_of_day % interval != 0 {
        return Err(Violation::Misaligned {
            minute_of_day,
            interval,
        });
    }

    let end_minute = minute_of_day + duration_minutes;
    let fits = policy
        .working_blocks
        .day(local.weekday)
        .iter()
        .any(|b| b.contains(minute_of_day, end_minute));
    if !fits {
        return Err(Violation::OutsideWorkingHours);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn wt(s: &str) -> WallTime {
        s.parse().unwrap()
    }

    fn block(a: &str, b: &str) -> TimeBlock {
        TimeBlock::new(wt(a), wt(b))
    }

    /// Madrid, Monday 09:00-13:00 only, 30-minute slots, two months ahead.
    fn monday_morning() -> AvailabilityPolicy {
        let mut p = AvailabilityPolicy {
            timezone: "Europe/Madrid".into(),
            working_blocks: WeeklyHours::default(),
            closed_dates: BTreeSet::new(),
            slot_interval_minutes: 30,
            max_months_ahead: 2,
            capacity: 1,
        };
        p.working_blocks.monday = vec![block("09:00", "13:00")];
        p
    }

    const NOW: &str = "2026-10-18T10:00:00Z";

    #[test]
    fn wall_time_parses_and_displays() {
        assert_eq!(wt("09:05").minutes(), 545);
        assert_eq!(wt("24:00").minutes(), 1440);
        assert_eq!(wt("7:30").to_string(), "07:30");
        assert!("24:01".parse::<WallTime>().is_err());
        assert!("12:60".parse::<WallTime>().is_err());
        assert!("noon".parse::<WallTime>().is_err());
    }

    #[test]
    fn aligned_booking_inside_block_is_legal() {
        let p = monday_morning();
        // 2026-10-19 09:00 Madrid (CEST)
        assert_eq!(is_legal(&p, utc("2026-10-19T07:00:00Z"), 60, utc(NOW)), Ok(()));
        // Ends exactly at block end.
        assert_eq!(is_legal(&p, utc("2026-10-19T10:00:00Z"), 60, utc(NOW)), Ok(()));
    }

    #[test]
    fn booking_spilling_past_block_is_rejected() {
        let p = monday_morning();
        assert_eq!(
            is_legal(&p, utc("2026-10-19T10:30:00Z"), 60, utc(NOW)),
            Err(Violation::OutsideWorkingHours)
        );
    }

    #[test]
    fn off_grid_start_is_misaligned() {
        let p = monday_morning();
        assert_eq!(
            is_legal(&p, utc("2026-10-19T07:15:00Z"), 30, utc(NOW)),
            Err(Violation::Misaligned {
                minute_of_day: 9 * 60 + 15,
                interval: 30
            })
        );
        assert!(matches!(
            is_legal(&p, utc("2026-10-19T07:00:30Z"), 30, utc(NOW)),
            Err(Violation::Misaligned { .. })
        ));
    }

    #[test]
    fn closed_day_of_week_has_no_blocks() {
        let p = monday_morning();
        // Tuesday 09:00 Madrid
        assert_eq!(
            is_legal(&p, utc("2026-10-20T07:00:00Z"), 30, utc(NOW)),
            Err(Violation::OutsideWorkingHours)
        );
    }

    #[test]
    fn closed_date_is_checked_on_local_date() {
        let mut p = monday_morning();
        p.closed_dates.insert(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(
            is_legal(&p, utc("2026-10-19T07:00:00Z"), 30, utc(NOW)),
            Err(Violation::ClosedDate {
                date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
            })
        );
    }

    #[test]
    fn horizon_counts_calendar_months() {
        let mut p = monday_morning();
        p.working_blocks.thursday = vec![block("09:00", "13:00")];
        // 2026-12-31 is a Thursday, two calendar months after October.
        assert_eq!(is_legal(&p, utc("2026-12-31T08:00:00Z"), 30, utc(NOW)), Ok(()));
        // 2027-01-04 is a Monday, three months out.
        assert_eq!(
            is_legal(&p, utc("2027-01-04T08:00:00Z"), 30, utc(NOW)),
            Err(Violation::TooFarAhead { max_months: 2 })
        );
        p.max_months_ahead = 0;
        assert_eq!(is_legal(&p, utc("2027-01-04T08:00:00Z"), 30, utc(NOW)), Ok(()));
    }

    #[test]
    fn horizon_is_checked_before_closed_date() {
        let mut p = monday_morning();
        p.closed_dates.insert(NaiveDate::from_ymd_opt(2027, 1, 4).unwrap());
        assert_eq!(
            is_legal(&p, utc("2027-01-04T08:00:00Z"), 30, utc(NOW)),
            Err(Violation::TooFarAhead { max_months: 2 })
        );
    }

    #[test]
    fn sanitize_repairs_blocks_and_bounds() {
        let mut p = monday_morning();
        p.timezone = "Mars/Olympus".into();
        p.slot_interval_minutes = 1;
        p.capacity = 0;
        p.working_blocks.monday = vec![
            block("14:00", "18:00"),
            block("12:00", "12:00"),
            block("09:00", "13:00"),
            block("12:00", "13:30"),
            block("16:00", "17:00"),
        ];
        let p = p.sanitize("Europe/Lisbon");
        assert_eq!(p.timezone, "Europe/Lisbon");
        assert_eq!(p.slot_interval_minutes, MIN_SLOT_INTERVAL);
        assert_eq!(p.capacity, 1);
        assert_eq!(
            p.working_blocks.monday,
            vec![block("09:00", "13:30"), block("14:00", "18:00")]
        );
    }

    #[test]
    fn policy_without_blocks_has_no_working_hours() {
        assert!(AvailabilityPolicy::default().has_working_hours());
        let mut p = monday_morning();
        p.working_blocks.monday = vec![block("10:00", "10:00")];
        let p = p.sanitize("Europe/Madrid");
        assert!(!p.has_working_hours());
        assert_eq!(
            is_legal(&p, utc("2026-10-19T08:00:00Z"), 30, utc(NOW)),
            Err(Violation::OutsideWorkingHours)
        );
    }

    #[test]
    fn legacy_hours_become_two_blocks_per_working_day() {
        let p = AvailabilityPolicy::from_legacy(&LegacyHours::default(), "Europe/Madrid");
        let expected = vec![block("09:00", "13:00"), block("15:00", "18:00")];
        assert_eq!(p.working_blocks.monday, expected);
        assert_eq!(p.working_blocks.friday, expected);
        assert!(p.working_blocks.saturday.is_empty());
        assert!(p.working_blocks.sunday.is_empty());
        assert_eq!(p.slot_interval_minutes, 30);
        assert_eq!(p.max_months_ahead, 2);
        assert_eq!(p.capacity, 1);
        assert_eq!(AvailabilityPolicy::default(), p);
    }

    #[test]
    fn legacy_without_lunch_is_one_block() {
        let legacy = LegacyHours {
            lunch_start: 0,
            lunch_end: 0,
            working_days: vec![0, 6],
            staff_count: 3,
            ..LegacyHours::default()
        };
        let p = AvailabilityPolicy::from_legacy(&legacy, "Europe/Madrid");
        assert_eq!(p.working_blocks.sunday, vec![block("09:00", "18:00")]);
        assert_eq!(p.working_blocks.saturday, vec![block("09:00", "18:00")]);
        assert!(p.working_blocks.monday.is_empty());
        assert_eq!(p.capacity, 3);
    }

    #[test]
    fn policy_json_shape() {
        let json = r#"{
            "timezone": "Europe/Madrid",
            "working_blocks": { "monday": [{ "start": "09:00", "end": "13:00" }] },
            "closed_dates": ["2026-12-25"],
            "max_months_ahead": 2
        }"#;
        let p: AvailabilityPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(p.slot_interval_minutes, 30);
        assert_eq!(p.capacity, 1);
        assert_eq!(p.working_blocks.monday, vec![block("09:00", "13:00")]);
        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["working_blocks"]["monday"][0]["end"], "13:00");
    }
}

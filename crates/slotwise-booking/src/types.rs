use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use slotwise_core::{AppointmentId, ServiceId, SubjectId, TenantId};

/// Lifecycle state of an appointment.
///
/// Only `Pending` and `Confirmed` hold capacity; the other two are ignored by
/// the overlap query and by the reminder sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

/// A booked appointment. Timestamps are UTC; `start` is stored as epoch
/// seconds so the overlap and due-window queries stay numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub tenant_id: TenantId,
    pub subject_id: SubjectId,
    pub service_ids: Vec<ServiceId>,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub total_price_cents: i64,
    pub status: AppointmentStatus,
    pub notes: String,
    /// Minutes-before-start at which to remind. Empty means tenant defaults.
    pub reminder_offsets: Vec<i64>,
    /// Offsets already delivered. Grows only.
    pub sent_offsets: BTreeSet<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open `[start, end)` overlap test.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end() > start
    }
}

/// Who is acting on an appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// An end customer; may only touch their own appointments.
    Client(SubjectId),
    /// Tenant staff; unrestricted within the tenant.
    Operator,
}

impl Actor {
    pub fn is_operator(&self) -> bool {
        matches!(self, Actor::Operator)
    }

    pub fn can_access(&self, appointment: &Appointment) -> bool {
        match self {
            Actor::Operator => true,
            Actor::Client(subject) => *subject == appointment.subject_id,
        }
    }
}

/// Unit of a service's configured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Minutes,
    Hours,
}

impl std::fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationUnit::Minutes => write!(f, "minutes"),
            DurationUnit::Hours => write!(f, "hours"),
        }
    }
}

impl std::str::FromStr for DurationUnit {
    type Err = String;

    /// Accepts the canonical names plus the labels older catalogs stored.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minutes" | "min" | "min." | "m" => Ok(DurationUnit::Minutes),
            "hours" | "hour" | "h" | "horas" | "hora" => Ok(DurationUnit::Hours),
            other => Err(format!("unknown duration unit: {other}")),
        }
    }
}

pub const MAX_SERVICE_DURATION: u32 = 480;

/// A bookable service in the tenant's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub price_cents: i64,
    /// Between 1 and [`MAX_SERVICE_DURATION`] in `duration_unit`.
    pub duration: u32,
    pub duration_unit: DurationUnit,
    pub active: bool,
}

impl Service {
    pub fn duration_minutes(&self) -> u32 {
        match self.duration_unit {
            DurationUnit::Minutes => self.duration,
            DurationUnit::Hours => self.duration.saturating_mul(60),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("service name must not be empty".to_string());
        }
        if self.price_cents < 0 {
            return Err("service price must not be negative".to_string());
        }
        if !(1..=MAX_SERVICE_DURATION).contains(&self.duration) {
            return Err(format!(
                "service duration must be between 1 and {MAX_SERVICE_DURATION}"
            ));
        }
        Ok(())
    }
}

/// Duration and price of one service, as the catalog quotes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceQuote {
    pub duration_minutes: u32,
    pub price_cents: i64,
}

/// Who receives notifications for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub subject_id: SubjectId,
    pub name: String,
    pub email: Option<String>,
}

/// When a booking should start: an absolute instant, or a local wall-clock
/// date and time read in the tenant's zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartTime {
    Instant { start: DateTime<Utc> },
    Local { date: String, time: String },
}

/// Input to `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Operators book on behalf of a subject; clients always book for themselves.
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    pub service_ids: Vec<ServiceId>,
    #[serde(flatten)]
    pub start: StartTime,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reminder_offsets: Vec<i64>,
}

/// Partial update for `update`. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentChanges {
    #[serde(flatten)]
    pub start: Option<StartTime>,
    #[serde(default)]
    pub service_ids: Option<Vec<ServiceId>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reminder_offsets: Option<Vec<i64>>,
}

impl AppointmentChanges {
    /// True when the change can move the appointment's time footprint.
    pub fn touches_schedule(&self) -> bool {
        self.start.is_some() || self.service_ids.is_some()
    }
}

/// Longest accepted appointment note, in characters.
pub const MAX_NOTES_LEN: usize = 500;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Listing filter. `from`/`to` bound the start instant (half-open).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AppointmentFilter {
    /// 1-based page and clamped limit.
    pub fn paging(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        (page, limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

use chrono::{DateTime, NaiveDate, Utc};
use slotwise_core::{AppointmentId, ClockError, ServiceId, TenantId};
use thiserror::Error;

use crate::types::AppointmentStatus;

/// Why a proposed booking is not legal. Client-correctable; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("start {start} is not in the future")]
    InPast { start: DateTime<Utc> },

    #[error("booking is more than {max_months} calendar month(s) ahead")]
    TooFarAhead { max_months: u32 },

    #[error("{date} is a closed date")]
    ClosedDate { date: NaiveDate },

    #[error("start at minute {minute_of_day} of the day is not on a {interval}-minute slot")]
    Misaligned { minute_of_day: u32, interval: u32 },

    #[error("booking does not fit inside a working block of that day")]
    OutsideWorkingHours,

    #[error("no capacity left: {overlapping} overlapping appointment(s), capacity {capacity}")]
    NoCapacity { overlapping: usize, capacity: u32 },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Violation::InPast { .. } => "START_IN_PAST",
            Violation::TooFarAhead { .. } => "TOO_FAR_AHEAD",
            Violation::ClosedDate { .. } => "CLOSED_DATE",
            Violation::Misaligned { .. } => "MISALIGNED",
            Violation::OutsideWorkingHours => "OUTSIDE_WORKING_HOURS",
            Violation::NoCapacity { .. } => "NO_CAPACITY",
        }
    }
}

/// All booking-layer errors. The gateway maps `code()` to HTTP responses.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error("No availability policy configured for tenant {tenant}")]
    ConfigMissing { tenant: TenantId },

    #[error("Booking rejected: {0}")]
    Rejected(#[from] Violation),

    #[error("Appointment not found: {0}")]
    NotFound(AppointmentId),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Unknown or inactive services: {0:?}")]
    UnknownServices(Vec<ServiceId>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Clock(ClockError::InvalidTimeInput(_)) => "INVALID_TIME_INPUT",
            BookingError::Clock(ClockError::UnknownTimezone(_)) => "UNKNOWN_TIMEZONE",
            BookingError::ConfigMissing { .. } => "CONFIG_MISSING",
            BookingError::Rejected(v) => v.code(),
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::UnknownServices(_) => "UNKNOWN_SERVICES",
            BookingError::InvalidRequest(_) => "INVALID_REQUEST",
            BookingError::InvalidTenant(_) => "INVALID_TENANT",
            BookingError::StoreUnavailable(_) | BookingError::Io(_) => "STORE_UNAVAILABLE",
            BookingError::Serialization(_) => "STORE_CORRUPT",
        }
    }

    /// The violation behind a rejection, if this is one.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            BookingError::Rejected(v) => Some(v),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;

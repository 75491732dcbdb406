use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwise_core::{
    config::RemindersConfig,
    reminder::{DEFAULT_LOOKAHEAD_MINUTES, DEFAULT_REMINDER_OFFSETS, DEFAULT_TOLERANCE_MINUTES},
    AppointmentId,
};

pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Inputs of one reminder sweep over one tenant.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub now: DateTime<Utc>,
    /// Half-width of the due window, in minutes.
    pub tolerance_minutes: i64,
    /// Used for appointments without offsets of their own.
    pub default_offsets: Vec<i64>,
    /// Every unsent offset is due, regardless of the window.
    pub force_all: bool,
    /// Restrict the sweep to one appointment and skip the lookahead window.
    pub appointment_id: Option<AppointmentId>,
    pub lookahead_minutes: i64,
    /// Appointments processed at once.
    pub concurrency: usize,
}

impl SweepOptions {
    /// Defaults for a sweep at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            default_offsets: DEFAULT_REMINDER_OFFSETS.to_vec(),
            force_all: false,
            appointment_id: None,
            lookahead_minutes: DEFAULT_LOOKAHEAD_MINUTES,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    pub fn from_config(cfg: &RemindersConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            tolerance_minutes: cfg.tolerance_minutes.max(0),
            default_offsets: cfg.default_offsets.clone(),
            force_all: false,
            appointment_id: None,
            lookahead_minutes: cfg.lookahead_minutes.max(0),
            concurrency: cfg.concurrency.max(1),
        }
    }
}

/// One offset (or whole appointment) that could not be delivered or recorded.
/// It stays pending and is retried by the next sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub appointment_id: AppointmentId,
    /// `None` when the failure happened before any offset was attempted.
    pub offset: Option<i64>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Offsets newly recorded as delivered.
    pub sent: usize,
    /// Candidate appointments examined.
    pub checked: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.sent += other.sent;
        self.checked += other.checked;
        self.failures.extend(other.failures);
    }
}

//! `slotwise-core`: shared building blocks for the booking and reminder crates.
//!
//! | Module     | Contents                                              |
//! |------------|-------------------------------------------------------|
//! | `clock`    | Wall-clock ↔ UTC conversion for a tenant's timezone   |
//! | `config`   | `slotwise.toml` + `SLOTWISE_*` env configuration      |
//! | `error`    | Top-level and clock error types                       |
//! | `reminder` | Reminder defaults and notification kinds              |
//! | `types`    | Identifier newtypes                                   |

pub mod clock;
pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use error::{ClockError, Result, SlotwiseError};
pub use types::{AppointmentId, ServiceId, SubjectId, TenantId};

//! Booking side of slotwise: availability policy, validation, the SQLite
//! appointment store and the appointment lifecycle.
//!
//! | Module | Purpose |
//! |---|---|
//! | `policy` | Weekly working blocks, closed dates, horizon; `is_legal` |
//! | `validator` | Policy legality plus capacity against the store |
//! | `store` | `AppointmentStore` trait and its SQLite implementation |
//! | `catalog` | Service durations and prices |
//! | `contacts` | Client contact rows used for notifications |
//! | `manager` | Create / update / transition / delete appointments |
//! | `tenant` | Per-tenant stores and `TenantContext` |

pub mod catalog;
pub mod contacts;
pub mod db;
pub mod error;
pub mod manager;
pub mod policy;
pub mod store;
pub mod tenant;
pub mod types;
pub mod validator;

pub use error::{BookingError, Result, Violation};
pub use manager::BookingManager;
pub use policy::{AvailabilityPolicy, LegacyHours};
pub use store::{AppointmentStore, SqliteStore};
pub use tenant::{TenantContext, TenantRegistry};
pub use types::{Actor, Appointment, AppointmentStatus};

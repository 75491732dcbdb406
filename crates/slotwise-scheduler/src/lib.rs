//! Reminder scheduling for slotwise.
//!
//! `sweep` decides which reminder offsets are due and records delivered ones;
//! `engine` runs sweeps (and the cancelled-appointment purge) on a timer;
//! `notify` holds the recipient and sender seams.

pub mod engine;
pub mod error;
pub mod notify;
pub mod sweep;
pub mod types;

pub use engine::ReminderEngine;
pub use error::{Result, SchedulerError};
pub use notify::{
    build_sender, ClientDirectory, NotificationSender, Notifier, Recipient, RecipientResolver,
    SendReceipt,
};
pub use sweep::ReminderSweeper;
pub use types::{SweepFailure, SweepOptions, SweepReport};

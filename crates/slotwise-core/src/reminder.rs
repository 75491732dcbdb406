//! Reminder defaults and notification kinds, shared by the booking manager,
//! the reminder scheduler and the gateway.

use serde::{Deserialize, Serialize};

/// Offsets (minutes before start) used when an appointment has none of its own.
pub const DEFAULT_REMINDER_OFFSETS: [i64; 2] = [1440, 60];
/// Half-width of the "due" window around now, in minutes.
pub const DEFAULT_TOLERANCE_MINUTES: i64 = 2;
/// Forward window for candidate appointments: 24h offset plus margin.
pub const DEFAULT_LOOKAHEAD_MINUTES: i64 = 26 * 60;

/// Why a notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Created,
    Updated,
    Cancelled,
    Reactivated,
    Completed,
    Deleted,
    Reminder,
}

impl NotificationKind {
    /// Default subject line; template rendering lives outside this service.
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Created => "Your appointment has been booked",
            NotificationKind::Updated => "Your appointment was updated",
            NotificationKind::Cancelled => "Your appointment was cancelled",
            NotificationKind::Reactivated => "Your appointment was reactivated",
            NotificationKind::Completed => "Appointment completed",
            NotificationKind::Deleted => "Your appointment was removed",
            NotificationKind::Reminder => "Appointment reminder",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::Created => "created",
            NotificationKind::Updated => "updated",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::Reactivated => "reactivated",
            NotificationKind::Completed => "completed",
            NotificationKind::Deleted => "deleted",
            NotificationKind::Reminder => "reminder",
        };
        write!(f, "{s}")
    }
}

/// Effective reminder offsets: the appointment's own list when non-empty,
/// otherwise `defaults`; negatives dropped, duplicates removed, order kept.
pub fn effective_offsets(own: &[i64], defaults: &[i64]) -> Vec<i64> {
    let source = if own.is_empty() { defaults } else { own };
    let mut out: Vec<i64> = Vec::with_capacity(source.len());
    for &offset in source {
        if offset >= 0 && !out.contains(&offset) {
            out.push(offset);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_offsets_win_over_defaults() {
        assert_eq!(effective_offsets(&[30], &DEFAULT_REMINDER_OFFSETS), vec![30]);
    }

    #[test]
    fn empty_own_falls_back_to_defaults() {
        assert_eq!(effective_offsets(&[], &DEFAULT_REMINDER_OFFSETS), vec![1440, 60]);
    }

    #[test]
    fn negatives_and_duplicates_are_dropped() {
        assert_eq!(effective_offsets(&[60, -5, 60, 0, 15], &[]), vec![60, 0, 15]);
    }

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(NotificationKind::Reminder.to_string(), "reminder");
        assert_eq!(
            serde_json::to_string(&NotificationKind::Reactivated).unwrap(),
            r#""reactivated""#
        );
    }
}

//! Booking validator: policy legality plus capacity against the store.

use chrono::{DateTime, Duration, Utc};
use slotwise_core::{AppointmentId, TenantId};
use tracing::debug;

use crate::{
    error::{BookingError, Result, Violation},
    policy::{is_legal, AvailabilityPolicy},
    store::AppointmentStore,
};

/// Accept or reject `[start, start + duration)` for `tenant`.
///
/// Read-only. The first failing check wins: missing policy, then the policy
/// checks of [`is_legal`], then capacity. `exclude` leaves one appointment
/// out of the capacity count (an appointment being rescheduled).
pub fn validate<S: AppointmentStore + ?Sized>(
    tenant: &TenantId,
    policy: Option<&AvailabilityPolicy>,
    store: &S,
    start: DateTime<Utc>,
    duration_minutes: u32,
    exclude: Option<&AppointmentId>,
    now: DateTime<Utc>,
) -> Result<()> {
    let policy = policy.ok_or_else(|| BookingError::ConfigMissing {
        tenant: tenant.clone(),
    })?;
    if duration_minutes == 0 {
        return Err(BookingError::InvalidRequest(
            "duration must be at least one minute".to_string(),
        ));
    }

    is_legal(policy, start, duration_minutes, now)?;

    let end = start + Duration::minutes(i64::from(duration_minutes));
    let overlapping = store
        .find_overlapping(tenant, start, end, exclude)?
        .into_iter()
        .filter(|a| a.overlaps(start, end) && Some(&a.id) != exclude)
        .count();
    let capacity = policy.capacity.max(1);
    debug!(%tenant, %start, overlapping, capacity, "capacity check");
    if overlapping >= capacity as usize {
        return Err(Violation::NoCapacity {
            overlapping,
            capacity,
        }
        .into());
    }
    Ok(())
}

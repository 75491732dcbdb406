//! Appointment lifecycle: create, change, status transitions, delete, read.
//!
//! Every mutating operation runs inside one immediate SQLite transaction on
//! the tenant's store, so validation and the write see the same rows.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use slotwise_core::{
    clock::{parse_local, to_utc},
    reminder::effective_offsets,
    AppointmentId, ServiceId,
};
use tracing::{info, instrument};

use crate::{
    catalog::ServiceCatalog,
    error::{BookingError, Result, Violation},
    store::{self, timestamp},
    tenant::TenantContext,
    types::{
        Actor, Appointment, AppointmentChanges, AppointmentFilter, AppointmentStatus,
        BookingRequest, Page, StartTime, MAX_NOTES_LEN,
    },
    validator::validate,
};

pub struct BookingManager<'a> {
    ctx: &'a TenantContext,
}

impl<'a> BookingManager<'a> {
    pub fn new(ctx: &'a TenantContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(tenant = %self.ctx.tenant))]
    pub fn create(
        &self,
        actor: &Actor,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let subject_id = match (actor, request.subject_id) {
            (Actor::Operator, Some(subject)) => subject,
            (Actor::Operator, None) => {
                return Err(BookingError::InvalidRequest(
                    "subject_id is required when booking for a client".to_string(),
                ))
            }
            (Actor::Client(own), Some(other)) if *own != other => {
                return Err(BookingError::Forbidden(
                    "clients can only book for themselves".to_string(),
                ))
            }
            (Actor::Client(own), _) => own.clone(),
        };
        let start = self.resolve_start(&request.start)?;
        ensure_future(start, now)?;
        let notes = clean_notes(&request.notes)?;
        let service_ids = dedup(request.service_ids);
        let status = if actor.is_operator() {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        };

        let appointment = self.ctx.store.transaction(|conn| {
            let (duration_minutes, total_price_cents) = self.price(conn, &service_ids)?;
            validate(
                &self.ctx.tenant,
                self.ctx.policy.as_ref(),
                conn,
                start,
                duration_minutes,
                None,
                now,
            )?;
            let stamp = timestamp(now);
            let appointment = Appointment {
                id: AppointmentId::new(),
                tenant_id: self.ctx.tenant.clone(),
                subject_id,
                service_ids,
                start,
                duration_minutes,
                total_price_cents,
                status,
                notes,
                reminder_offsets: effective_offsets(&request.reminder_offsets, &[]),
                sent_offsets: Default::default(),
                created_at: stamp.clone(),
                updated_at: stamp,
            };
            store::insert_appointment(conn, &appointment)?;
            Ok(appointment)
        })?;

        info!(
            appointment_id = %appointment.id,
            subject = %appointment.subject_id,
            start = %appointment.start,
            duration = appointment.duration_minutes,
            "appointment created"
        );
        Ok(appointment)
    }

    /// Reschedule, change services, notes or reminder offsets. Re-validates
    /// (excluding this appointment) only when the time footprint may move.
    #[instrument(skip(self, changes), fields(tenant = %self.ctx.tenant))]
    pub fn update(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        changes: AppointmentChanges,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let new_start = changes
            .start
            .as_ref()
            .map(|s| self.resolve_start(s))
            .transpose()?;
        let notes = changes.notes.as_deref().map(clean_notes).transpose()?;

        let updated = self.ctx.store.transaction(|conn| {
            let mut appt = self.load_for(conn, actor, id)?;
            if !appt.status.is_active() {
                return Err(BookingError::InvalidRequest(format!(
                    "a {} appointment cannot be changed",
                    appt.status
                )));
            }

            if changes.touches_schedule() {
                if let Some(ids) = changes.service_ids.clone() {
                    let ids = dedup(ids);
                    let (duration, price) = self.price(conn, &ids)?;
                    appt.service_ids = ids;
                    appt.duration_minutes = duration;
                    appt.total_price_cents = price;
                }
                if let Some(start) = new_start {
                    appt.start = start;
                }
                ensure_future(appt.start, now)?;
                validate(
                    &self.ctx.tenant,
                    self.ctx.policy.as_ref(),
                    conn,
                    appt.start,
                    appt.duration_minutes,
                    Some(&appt.id),
                    now,
                )?;
            }
            if let Some(notes) = notes {
                appt.notes = notes;
            }
            if let Some(offsets) = &changes.reminder_offsets {
                appt.reminder_offsets = effective_offsets(offsets, &[]);
            }
            appt.updated_at = timestamp(now);
            store::update_appointment(conn, &appt)?;
            Ok(appt)
        })?;

        info!(appointment_id = %updated.id, start = %updated.start, "appointment updated");
        Ok(updated)
    }

    /// `pending -> confirmed`. Operators only.
    pub fn confirm(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.transition(actor, id, now, AppointmentStatus::Confirmed)
    }

    /// `pending | confirmed -> cancelled`.
    pub fn cancel(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.transition(actor, id, now, AppointmentStatus::Cancelled)
    }

    /// `cancelled -> pending`, provided the slot is still legal and free.
    pub fn reactivate(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.transition(actor, id, now, AppointmentStatus::Pending)
    }

    /// `* -> completed` from any state but completed. Operators only.
    pub fn complete(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.transition(actor, id, now, AppointmentStatus::Completed)
    }

    /// Hard delete. Operators only. Returns the removed appointment.
    #[instrument(skip(self), fields(tenant = %self.ctx.tenant))]
    pub fn delete(&self, actor: &Actor, id: &AppointmentId) -> Result<Appointment> {
        require_operator(actor, "delete appointments")?;
        let removed = self.ctx.store.transaction(|conn| {
            let appt = self.load_for(conn, actor, id)?;
            store::delete_appointment(conn, &self.ctx.tenant, id)?;
            Ok(appt)
        })?;
        info!(appointment_id = %id, "appointment deleted");
        Ok(removed)
    }

    pub fn get(&self, actor: &Actor, id: &AppointmentId) -> Result<Appointment> {
        self.ctx.store.with_conn(|conn| self.load_for(conn, actor, id))
    }

    /// Clients only ever see their own appointments.
    pub fn list(&self, actor: &Actor, mut filter: AppointmentFilter) -> Result<Page<Appointment>> {
        if let Actor::Client(own) = actor {
            filter.subject_id = Some(own.clone());
        }
        self.ctx.store.list(&self.ctx.tenant, &filter)
    }

    // --- private helpers ---------------------------------------------------

    #[instrument(skip(self), fields(tenant = %self.ctx.tenant))]
    fn transition(
        &self,
        actor: &Actor,
        id: &AppointmentId,
        now: DateTime<Utc>,
        to: AppointmentStatus,
    ) -> Result<Appointment> {
        if matches!(to, AppointmentStatus::Confirmed | AppointmentStatus::Completed) {
            require_operator(actor, &format!("mark appointments {to}"))?;
        }

        let appt = self.ctx.store.transaction(|conn| {
            let mut appt = self.load_for(conn, actor, id)?;
            let from = appt.status;
            let allowed = match to {
                AppointmentStatus::Confirmed => from == AppointmentStatus::Pending,
                AppointmentStatus::Cancelled => from.is_active(),
                AppointmentStatus::Pending => from == AppointmentStatus::Cancelled,
                AppointmentStatus::Completed => from != AppointmentStatus::Completed,
            };
            if !allowed {
                return Err(BookingError::InvalidTransition { from, to });
            }
            if to == AppointmentStatus::Pending {
                ensure_future(appt.start, now)?;
                validate(
                    &self.ctx.tenant,
                    self.ctx.policy.as_ref(),
                    conn,
                    appt.start,
                    appt.duration_minutes,
                    Some(&appt.id),
                    now,
                )?;
            }
            store::set_status(conn, &self.ctx.tenant, id, to, now)?;
            appt.status = to;
            appt.updated_at = timestamp(now);
            Ok(appt)
        })?;

        info!(appointment_id = %id, status = %to, "appointment status changed");
        Ok(appt)
    }

    fn load_for(
        &self,
        conn: &Connection,
        actor: &Actor,
        id: &AppointmentId,
    ) -> Result<Appointment> {
        let appt = store::get_appointment(conn, &self.ctx.tenant, id)?
            .ok_or_else(|| BookingError::NotFound(id.clone()))?;
        if !actor.can_access(&appt) {
            return Err(BookingError::Forbidden(
                "appointment belongs to another client".to_string(),
            ));
        }
        Ok(appt)
    }

    /// Total duration (minutes) and price (cents) of a service list.
    fn price(&self, conn: &Connection, ids: &[ServiceId]) -> Result<(u32, i64)> {
        let quotes = conn.quote(&self.ctx.tenant, ids)?;
        Ok(quotes.iter().fold((0u32, 0i64), |(d, p), q| {
            (d.saturating_add(q.duration_minutes), p + q.price_cents)
        }))
    }

    fn resolve_start(&self, start: &StartTime) -> Result<DateTime<Utc>> {
        match start {
            StartTime::Instant { start } => Ok(*start),
            StartTime::Local { date, time } => {
                let policy = self.ctx.policy.as_ref().ok_or_else(|| BookingError::ConfigMissing {
                    tenant: self.ctx.tenant.clone(),
                })?;
                let (d, t) = parse_local(date, time)?;
                Ok(to_utc(d, t, policy.tz()))
            }
        }
    }
}

fn require_operator(actor: &Actor, what: &str) -> Result<()> {
    if actor.is_operator() {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!("only operators can {what}")))
    }
}

/// Bookings and reschedules must start strictly after `now`.
fn ensure_future(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if start <= now {
        return Err(Violation::InPast { start }.into());
    }
    Ok(())
}

fn clean_notes(notes: &str) -> Result<String> {
    let notes = notes.trim();
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(BookingError::InvalidRequest(format!(
            "notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }
    Ok(notes.to_string())
}

fn dedup(ids: Vec<ServiceId>) -> Vec<ServiceId> {
    let mut out: Vec<ServiceId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

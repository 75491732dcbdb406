//! One reminder sweep over one tenant.
//!
//! A sweep can run any number of times for the same `now`: an offset is only
//! recorded after a confirmed send, recording is a set-union, and recorded
//! offsets are never due again.

use chrono::Duration;
use chrono_tz::Tz;
use futures_util::{stream, StreamExt};
use slotwise_booking::{Appointment, AppointmentStore, TenantContext};
use slotwise_core::reminder::{effective_offsets, NotificationKind};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Result, SchedulerError},
    notify::{NotificationData, Notifier},
    types::{SweepFailure, SweepOptions, SweepReport},
};

/// Offsets of `appointment` that should be sent now, in effective order.
///
/// An offset is due when it was never delivered and either `force_all` is
/// set or its target `start - offset` lies within `now ± tolerance`
/// (inclusive on both ends).
pub fn due_offsets(appointment: &Appointment, options: &SweepOptions) -> Vec<i64> {
    let tolerance = Duration::minutes(options.tolerance_minutes.max(0));
    effective_offsets(&appointment.reminder_offsets, &options.default_offsets)
        .into_iter()
        .filter(|offset| !appointment.sent_offsets.contains(offset))
        .filter(|offset| {
            if options.force_all {
                return true;
            }
            let target = appointment.start - Duration::minutes(*offset);
            target >= options.now - tolerance && target <= options.now + tolerance
        })
        .collect()
}

pub struct ReminderSweeper {
    notifier: Notifier,
}

impl ReminderSweeper {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Sweep `ctx` once. Only a failing candidate query fails the sweep;
    /// anything that goes wrong per appointment is reported in `failures`.
    #[instrument(skip(self, ctx, options), fields(tenant = %ctx.tenant, now = %options.now))]
    pub async fn sweep(&self, ctx: &TenantContext, options: &SweepOptions) -> Result<SweepReport> {
        let until = options.now + Duration::minutes(options.lookahead_minutes.max(0));
        let candidates = ctx.store.find_due_candidates(
            &ctx.tenant,
            options.now,
            until,
            options.appointment_id.as_ref(),
        )?;

        let tz = ctx.tz();
        let checked = candidates.len();

        let reports: Vec<SweepReport> = stream::iter(candidates)
            .map(|appt| self.process(ctx, appt, options, tz))
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            checked,
            ..Default::default()
        };
        for r in reports {
            report.merge(r);
        }

        if report.sent > 0 || !report.failures.is_empty() {
            info!(
                sent = report.sent,
                checked = report.checked,
                failures = report.failures.len(),
                "reminder sweep finished"
            );
        } else {
            debug!(checked = report.checked, "reminder sweep finished");
        }
        Ok(report)
    }

    async fn process(
        &self,
        ctx: &TenantContext,
        appt: Appointment,
        options: &SweepOptions,
        tz: Tz,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let due = due_offsets(&appt, options);
        if due.is_empty() {
            return report;
        }

        let to = match self.notifier.resolver.resolve_contact(&ctx.tenant, &appt).await {
            Ok(Some(to)) => to,
            Ok(None) => {
                debug!(appointment_id = %appt.id, "no address; reminders left pending");
                return report;
            }
            Err(e) => {
                report.failures.push(failure(&appt, None, &e));
                return report;
            }
        };

        for offset in due {
            let data = NotificationData::new(&appt, &to, tz, Some(offset));
            let receipt = match self
                .notifier
                .sender
                .send(NotificationKind::Reminder, &to, &data)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(appointment_id = %appt.id, offset, "reminder send failed: {e}");
                    report.failures.push(failure(&appt, Some(offset), &e));
                    continue;
                }
            };
            if !receipt.is_confirmed() {
                let e = SchedulerError::SendFailed("provider did not confirm the send".to_string());
                report.failures.push(failure(&appt, Some(offset), &e));
                continue;
            }

            match ctx
                .store
                .add_sent_offset(&ctx.tenant, &appt.id, offset, options.now)
            {
                Ok(true) => {
                    report.sent += 1;
                    info!(
                        appointment_id = %appt.id,
                        offset,
                        reference = ?receipt.reference,
                        "reminder sent"
                    );
                }
                Ok(false) => {
                    debug!(appointment_id = %appt.id, offset, "offset already recorded");
                }
                Err(e) => {
                    let e = SchedulerError::from(e);
                    warn!(appointment_id = %appt.id, offset, "could not record reminder: {e}");
                    report.failures.push(failure(&appt, Some(offset), &e));
                }
            }
        }
        report
    }
}

fn failure(appt: &Appointment, offset: Option<i64>, e: &SchedulerError) -> SweepFailure {
    SweepFailure {
        appointment_id: appt.id.clone(),
        offset,
        code: e.code().to_string(),
        message: e.to_string(),
    }
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use slotwise_booking::TenantRegistry;
use slotwise_core::{
    config::{PurgeConfig, RemindersConfig},
    TenantId,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{
    error::Result,
    sweep::ReminderSweeper,
    types::{SweepOptions, SweepReport},
};

/// Periodic driver: sweeps reminders for every known tenant and purges
/// stale cancelled appointments.
///
/// Each tick runs to completion before the next one is taken, so sweeps of
/// one tenant never overlap.
pub struct ReminderEngine {
    registry: Arc<TenantRegistry>,
    sweeper: Arc<ReminderSweeper>,
    reminders: RemindersConfig,
    purge: PurgeConfig,
}

impl ReminderEngine {
    pub fn new(
        registry: Arc<TenantRegistry>,
        sweeper: Arc<ReminderSweeper>,
        reminders: RemindersConfig,
        purge: PurgeConfig,
    ) -> Self {
        Self {
            registry,
            sweeper,
            reminders,
            purge,
        }
    }

    /// Main loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            reminders = self.reminders.enabled,
            tick_secs = self.reminders.tick_secs,
            purge = self.purge.enabled,
            "reminder engine started"
        );

        let mut sweep_tick =
            tokio::time::interval(StdDuration::from_secs(self.reminders.tick_secs.max(1)));
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut purge_tick =
            tokio::time::interval(StdDuration::from_secs(self.purge.interval_secs.max(1)));
        purge_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sweep_tick.tick(), if self.reminders.enabled => {
                    self.sweep_all(Utc::now()).await;
                }
                _ = purge_tick.tick(), if self.purge.enabled => {
                    self.purge_all(Utc::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Sweep every known tenant concurrently at `now`.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> Vec<(TenantId, Result<SweepReport>)> {
        let options = SweepOptions::from_config(&self.reminders, now);
        let tenants = self.registry.tenants();
        let runs = tenants.into_iter().map(|tenant| {
            let options = options.clone();
            async move {
                let result = match self.registry.resolve(tenant.as_str()) {
                    Ok(ctx) => self.sweeper.sweep(&ctx, &options).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = &result {
                    error!(%tenant, code = e.code(), "reminder sweep failed: {e}");
                }
                (tenant, result)
            }
        });
        join_all(runs).await
    }

    /// Delete cancelled appointments older than the configured age, per tenant.
    /// Returns the total number removed.
    pub fn purge_all(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::minutes(self.purge.cancelled_age_minutes.max(0));
        let mut total = 0;
        for tenant in self.registry.tenants() {
            let purged = self
                .registry
                .store(&tenant)
                .and_then(|store| store.purge_cancelled(&tenant, cutoff));
            match purged {
                Ok(n) => total += n,
                Err(e) => warn!(%tenant, "purge failed: {e}"),
            }
        }
        total
    }
}

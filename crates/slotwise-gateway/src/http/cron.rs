//! Reminder trigger for external schedulers: POST /cron/reminders.
//!
//! Authenticated with `X-Cron-Token`, scoped with `X-Tenant-Id`. The body is
//! optional; an empty body sweeps at the current time with configured
//! defaults.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use slotwise_core::{config::RemindersConfig, AppointmentId};
use slotwise_scheduler::SweepOptions;
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{header_str, verify_cron_token, TENANT_HEADER};
use super::error::{api_error, booking_error, ApiResult};
use crate::app::AppState;

/// Overrides accepted by the trigger.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CronRequest {
    pub now: Option<DateTime<Utc>>,
    pub tolerance_minutes: Option<i64>,
    /// Candidate lookahead in hours, replacing the configured window.
    #[serde(alias = "windowHours")]
    pub window_hours: Option<i64>,
    pub default_offsets: Option<Vec<i64>>,
    pub force_all: bool,
    pub appointment_id: Option<AppointmentId>,
}

impl CronRequest {
    fn options(self, cfg: &RemindersConfig) -> SweepOptions {
        let mut options = SweepOptions::from_config(cfg, self.now.unwrap_or_else(Utc::now));
        if let Some(tolerance) = self.tolerance_minutes {
            options.tolerance_minutes = tolerance.max(0);
        }
        if let Some(hours) = self.window_hours {
            options.lookahead_minutes = hours.max(0).saturating_mul(60);
        }
        if let Some(offsets) = self.default_offsets {
            options.default_offsets = offsets;
        }
        options.force_all = self.force_all;
        options.appointment_id = self.appointment_id;
        options
    }
}

/// POST /cron/reminders
///
/// Returns `{ok, sent, checked, failures}`. Per-appointment failures do not
/// fail the call; only an unreachable store does (503).
pub async fn cron_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    verify_cron_token(&headers, state.config.gateway.cron_token.as_deref()).map_err(|e| {
        warn!(reason = %e, "cron trigger rejected");
        api_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", e)
    })?;

    let tenant = header_str(&headers, TENANT_HEADER).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_TENANT",
            "missing X-Tenant-Id header",
        )
    })?;
    let ctx = state.registry.resolve(tenant).map_err(booking_error)?;

    let request: CronRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CronRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                format!("invalid JSON body: {e}"),
            )
        })?
    };
    let options = request.options(&state.config.reminders);

    let report = state.sweeper.sweep(&ctx, &options).await.map_err(|e| {
        warn!(tenant = %ctx.tenant, code = e.code(), "cron sweep failed: {e}");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": {"code": e.code(), "message": e.to_string()},
            })),
        )
    })?;

    info!(
        tenant = %ctx.tenant,
        sent = report.sent,
        checked = report.checked,
        failures = report.failures.len(),
        "cron reminder sweep"
    );
    Ok(Json(json!({
        "ok": true,
        "sent": report.sent,
        "checked": report.checked,
        "failures": report.failures,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> CronRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn empty_request_keeps_configured_window() {
        let cfg = RemindersConfig::default();
        let options = parse("{}").options(&cfg);
        assert_eq!(options.lookahead_minutes, cfg.lookahead_minutes);
        assert_eq!(options.tolerance_minutes, cfg.tolerance_minutes);
        assert!(!options.force_all);
    }

    #[test]
    fn window_hours_replaces_lookahead() {
        let cfg = RemindersConfig::default();
        assert_eq!(parse(r#"{"window_hours": 48}"#).options(&cfg).lookahead_minutes, 2880);
        assert_eq!(parse(r#"{"windowHours": 2}"#).options(&cfg).lookahead_minutes, 120);
        assert_eq!(parse(r#"{"window_hours": -3}"#).options(&cfg).lookahead_minutes, 0);
    }
}

//! Availability policy per tenant.
//!
//! GET    /tenants/{tenant}/settings         current policy
//! PUT    /tenants/{tenant}/settings         replace policy (operator)
//! PUT    /tenants/{tenant}/settings/legacy  replace from legacy hours (operator)

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use slotwise_booking::{AvailabilityPolicy, LegacyHours};
use std::sync::Arc;
use tracing::info;

use super::auth::{actor_from_headers, require_operator};
use super::error::{booking_error, ApiResult};
use crate::app::AppState;

/// GET /tenants/{tenant}/settings
///
/// Tenants without a stored policy get the default one with
/// `configured: false`; booking against them still fails with CONFIG_MISSING.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> ApiResult {
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;
    Ok(Json(match ctx.policy {
        Some(policy) => json!({"configured": true, "policy": policy}),
        None => {
            let fallback =
                AvailabilityPolicy::default().sanitize(state.registry.default_timezone());
            json!({"configured": false, "policy": fallback})
        }
    }))
}

/// PUT /tenants/{tenant}/settings
pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(policy): Json<AvailabilityPolicy>,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    require_operator(&actor)?;
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;
    let policy = policy.sanitize(state.registry.default_timezone());
    ctx.store
        .save_policy(&ctx.tenant, &policy)
        .map_err(booking_error)?;
    info!(tenant = %ctx.tenant, timezone = %policy.timezone, "availability policy saved");
    Ok(Json(json!({"configured": true, "policy": policy})))
}

/// Legacy hour-based settings plus an optional zone.
#[derive(Debug, Deserialize)]
pub struct LegacySettings {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(flatten)]
    pub hours: LegacyHours,
}

/// PUT /tenants/{tenant}/settings/legacy
///
/// Converts hour-based settings into working blocks. Closed dates of the
/// current policy are kept.
pub async fn put_legacy_settings(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(body): Json<LegacySettings>,
) -> ApiResult<Value> {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    require_operator(&actor)?;
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;

    let timezone = body
        .timezone
        .or_else(|| ctx.policy.as_ref().map(|p| p.timezone.clone()))
        .unwrap_or_else(|| state.registry.default_timezone().to_string());
    let mut policy = AvailabilityPolicy::from_legacy(&body.hours, &timezone);
    if let Some(current) = &ctx.policy {
        policy.closed_dates = current.closed_dates.clone();
    }
    let policy = policy.sanitize(state.registry.default_timezone());

    ctx.store
        .save_policy(&ctx.tenant, &policy)
        .map_err(booking_error)?;
    info!(tenant = %ctx.tenant, "availability policy converted from legacy hours");
    Ok(Json(json!({"configured": true, "policy": policy})))
}

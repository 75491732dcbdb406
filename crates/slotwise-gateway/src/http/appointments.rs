//! Appointment endpoints. Every write goes through `BookingManager`, so the
//! validator runs for creates, reschedules and reactivations alike.
//!
//! GET    /tenants/{tenant}/appointments
//! POST   /tenants/{tenant}/appointments
//! GET    /tenants/{tenant}/appointments/{id}
//! PATCH  /tenants/{tenant}/appointments/{id}
//! DELETE /tenants/{tenant}/appointments/{id}
//! POST   /tenants/{tenant}/appointments/{id}/{confirm|cancel|reactivate|complete}

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use slotwise_booking::{
    types::{AppointmentChanges, AppointmentFilter, BookingRequest},
    Appointment, BookingManager, TenantContext,
};
use slotwise_core::{reminder::NotificationKind, AppointmentId};
use std::sync::Arc;

use super::auth::actor_from_headers;
use super::error::{booking_error, ApiError, ApiResult};
use crate::app::AppState;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn tenant(state: &AppState, raw: &str) -> Result<TenantContext, ApiError> {
    state.registry.resolve(raw).map_err(booking_error)
}

/// Queue a lifecycle message in the tenant's zone. Never blocks the response.
fn notify(state: &AppState, ctx: &TenantContext, kind: NotificationKind, appt: &Appointment) {
    state.notifier.spawn_notify(kind, appt.clone(), ctx.tz());
}

fn appointment_json(appt: Appointment) -> Json<Value> {
    Json(json!({"appointment": appt}))
}

// ── Collection ────────────────────────────────────────────────────────────────

/// GET /tenants/{tenant}/appointments?from=&to=&status=&subject_id=&page=&limit=
///
/// Clients only ever see their own appointments.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Path(raw_tenant): Path<String>,
    headers: HeaderMap,
    Query(filter): Query<AppointmentFilter>,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let page = BookingManager::new(&ctx)
        .list(&actor, filter)
        .map_err(booking_error)?;
    Ok(Json(json!(page)))
}

/// POST /tenants/{tenant}/appointments
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Path(raw_tenant): Path<String>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let appt = BookingManager::new(&ctx)
        .create(&actor, request, Utc::now())
        .map_err(booking_error)?;
    notify(&state, &ctx, NotificationKind::Created, &appt);
    Ok((StatusCode::CREATED, appointment_json(appt)))
}

// ── Single appointment ────────────────────────────────────────────────────────

/// GET /tenants/{tenant}/appointments/{id}
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path((raw_tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let appt = BookingManager::new(&ctx)
        .get(&actor, &AppointmentId::from(id))
        .map_err(booking_error)?;
    Ok(appointment_json(appt))
}

/// PATCH /tenants/{tenant}/appointments/{id}
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Path((raw_tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(changes): Json<AppointmentChanges>,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let appt = BookingManager::new(&ctx)
        .update(&actor, &AppointmentId::from(id), changes, Utc::now())
        .map_err(booking_error)?;
    notify(&state, &ctx, NotificationKind::Updated, &appt);
    Ok(appointment_json(appt))
}

/// DELETE /tenants/{tenant}/appointments/{id} (operator)
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Path((raw_tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let appt = BookingManager::new(&ctx)
        .delete(&actor, &AppointmentId::from(id))
        .map_err(booking_error)?;
    notify(&state, &ctx, NotificationKind::Deleted, &appt);
    Ok(Json(json!({"deleted": appt.id})))
}

// ── Status transitions ────────────────────────────────────────────────────────

/// POST /tenants/{tenant}/appointments/{id}/{action}
pub async fn transition_appointment(
    State(state): State<Arc<AppState>>,
    Path((raw_tenant, id, action)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    let ctx = tenant(&state, &raw_tenant)?;
    let manager = BookingManager::new(&ctx);
    let id = AppointmentId::from(id);
    let now = Utc::now();

    let (result, kind) = match action.as_str() {
        "confirm" => (manager.confirm(&actor, &id, now), NotificationKind::Updated),
        "cancel" => (manager.cancel(&actor, &id, now), NotificationKind::Cancelled),
        "reactivate" => (
            manager.reactivate(&actor, &id, now),
            NotificationKind::Reactivated,
        ),
        "complete" => (manager.complete(&actor, &id, now), NotificationKind::Completed),
        other => {
            return Err(super::error::api_error(
                StatusCode::NOT_FOUND,
                "UNKNOWN_ACTION",
                format!("unknown appointment action: {other}"),
            ))
        }
    };
    let appt = result.map_err(booking_error)?;
    notify(&state, &ctx, kind, &appt);
    Ok(appointment_json(appt))
}

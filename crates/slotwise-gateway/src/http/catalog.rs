//! Service catalog and client contacts.
//!
//! GET /tenants/{tenant}/services
//! PUT /tenants/{tenant}/services/{service}   (operator)
//! PUT /tenants/{tenant}/clients/{subject}    (operator, or the client itself)

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use slotwise_booking::types::{Contact, DurationUnit, Service};
use slotwise_booking::Actor;
use std::sync::Arc;
use tracing::info;

use super::auth::{actor_from_headers, require_operator};
use super::error::{booking_error, ApiResult};
use crate::app::AppState;

/// GET /tenants/{tenant}/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> ApiResult {
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;
    let services = ctx.store.list_services(&ctx.tenant).map_err(booking_error)?;
    Ok(Json(json!({"services": services})))
}

#[derive(Debug, Deserialize)]
pub struct ServiceBody {
    pub name: String,
    pub price_cents: i64,
    pub duration: u32,
    pub duration_unit: DurationUnit,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// PUT /tenants/{tenant}/services/{service}
pub async fn put_service(
    State(state): State<Arc<AppState>>,
    Path((tenant, service_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ServiceBody>,
) -> ApiResult<Value> {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    require_operator(&actor)?;
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;
    let service = Service {
        id: service_id.into(),
        name: body.name,
        price_cents: body.price_cents,
        duration: body.duration,
        duration_unit: body.duration_unit,
        active: body.active,
    };
    ctx.store
        .upsert_service(&ctx.tenant, &service)
        .map_err(booking_error)?;
    info!(tenant = %ctx.tenant, service_id = %service.id, "service saved");
    Ok(Json(json!({"service": service})))
}

#[derive(Debug, Deserialize)]
pub struct ContactBody {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// PUT /tenants/{tenant}/clients/{subject}
pub async fn put_contact(
    State(state): State<Arc<AppState>>,
    Path((tenant, subject)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ContactBody>,
) -> ApiResult<Value> {
    let actor = actor_from_headers(&headers, &state.config.gateway)?;
    if let Actor::Client(own) = &actor {
        if own.as_str() != subject {
            require_operator(&actor)?;
        }
    }
    let ctx = state.registry.resolve(&tenant).map_err(booking_error)?;
    let contact = Contact {
        subject_id: subject.into(),
        name: body.name,
        email: body.email,
    };
    ctx.store
        .upsert_contact(&ctx.tenant, &contact)
        .map_err(booking_error)?;
    Ok(Json(json!({"client": contact})))
}

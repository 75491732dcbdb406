//! JSON error bodies shared by every handler: `{"error": {"code", "message"}}`.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use slotwise_booking::BookingError;
use tracing::{error, warn};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T = Value> = Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, code: &str, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(json!({"error": {"code": code, "message": message.to_string()}})),
    )
}

/// HTTP status for a booking error code.
pub fn status_for(e: &BookingError) -> StatusCode {
    match e {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
        BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
        BookingError::Rejected(v) if v.code() == "NO_CAPACITY" => StatusCode::CONFLICT,
        BookingError::StoreUnavailable(_) | BookingError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub fn booking_error(e: BookingError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(code = e.code(), "booking store failure: {e}");
    } else {
        warn!(code = e.code(), "request rejected: {e}");
    }
    api_error(status, e.code(), e)
}

//! Caller identity.
//!
//! `Authorization: Bearer <operator_token>` acts as the business operator.
//! Otherwise `X-Subject-Id` names the client acting on their own bookings.
//! Token issuance lives outside this service.

use axum::http::{HeaderMap, StatusCode};
use slotwise_booking::Actor;
use slotwise_core::config::GatewayConfig;
use tracing::warn;

use super::error::{api_error, ApiError};

pub const SUBJECT_HEADER: &str = "x-subject-id";
pub const CRON_TOKEN_HEADER: &str = "x-cron-token";
pub const TENANT_HEADER: &str = "x-tenant-id";

pub fn actor_from_headers(headers: &HeaderMap, cfg: &GatewayConfig) -> Result<Actor, ApiError> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let token = auth.strip_prefix("Bearer ").ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authorization header must use Bearer scheme",
            )
        })?;
        return match cfg.operator_token.as_deref() {
            Some(expected) if token == expected => Ok(Actor::Operator),
            _ => {
                warn!("operator token mismatch");
                Err(api_error(
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHENTICATED",
                    "operator token mismatch",
                ))
            }
        };
    }

    match header_str(headers, SUBJECT_HEADER) {
        Some(subject) => Ok(Actor::Client(subject.into())),
        None => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "missing Authorization or X-Subject-Id header",
        )),
    }
}

pub fn require_operator(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_operator() {
        Ok(())
    } else {
        Err(api_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "operator access required",
        ))
    }
}

/// The cron caller must present the configured shared token. With no token
/// configured every call is rejected.
pub fn verify_cron_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), String> {
    let expected = expected.ok_or_else(|| "no cron token configured".to_string())?;
    let token = header_str(headers, CRON_TOKEN_HEADER)
        .ok_or_else(|| "missing X-Cron-Token header".to_string())?;
    if token == expected {
        Ok(())
    } else {
        Err("cron token mismatch".to_string())
    }
}

/// Trimmed, non-empty header value.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cfg() -> GatewayConfig {
        GatewayConfig {
            operator_token: Some("op-secret".into()),
            cron_token: Some("cron-secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn bearer_token_selects_operator() {
        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_static("Bearer op-secret"));
        assert_eq!(actor_from_headers(&h, &cfg()).unwrap(), Actor::Operator);

        h.insert("authorization", HeaderValue::from_static("Bearer nope"));
        let (status, _) = actor_from_headers(&h, &cfg()).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn subject_header_selects_client() {
        let mut h = HeaderMap::new();
        h.insert(SUBJECT_HEADER, HeaderValue::from_static(" ana "));
        assert_eq!(
            actor_from_headers(&h, &cfg()).unwrap(),
            Actor::Client("ana".into())
        );
        assert!(actor_from_headers(&HeaderMap::new(), &cfg()).is_err());
    }

    #[test]
    fn cron_token_is_required_and_compared() {
        let mut h = HeaderMap::new();
        assert!(verify_cron_token(&h, Some("cron-secret")).is_err());
        h.insert(CRON_TOKEN_HEADER, HeaderValue::from_static("cron-secret"));
        assert!(verify_cron_token(&h, Some("cron-secret")).is_ok());
        assert!(verify_cron_token(&h, Some("other")).is_err());
        assert!(verify_cron_token(&h, None).is_err());
    }
}

use axum::{
    routing::{get, post, put},
    Router,
};
use slotwise_booking::TenantRegistry;
use slotwise_core::config::SlotwiseConfig;
use slotwise_scheduler::{Notifier, ReminderSweeper};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::http::{appointments, catalog, cron, health, settings};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: SlotwiseConfig,
    pub registry: Arc<TenantRegistry>,
    /// Lifecycle notifications from request handlers.
    pub notifier: Notifier,
    /// Shared with the background engine so cron and tick sweeps behave alike.
    pub sweeper: Arc<ReminderSweeper>,
}

impl AppState {
    pub fn new(
        config: SlotwiseConfig,
        registry: Arc<TenantRegistry>,
        notifier: Notifier,
        sweeper: Arc<ReminderSweeper>,
    ) -> Self {
        Self {
            config,
            registry,
            notifier,
            sweeper,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/tenants/{tenant}/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route(
            "/tenants/{tenant}/settings/legacy",
            put(settings::put_legacy_settings),
        )
        .route("/tenants/{tenant}/services", get(catalog::list_services))
        .route(
            "/tenants/{tenant}/services/{service}",
            put(catalog::put_service),
        )
        .route(
            "/tenants/{tenant}/clients/{subject}",
            put(catalog::put_contact),
        )
        .route(
            "/tenants/{tenant}/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/tenants/{tenant}/appointments/{id}",
            get(appointments::get_appointment)
                .patch(appointments::update_appointment)
                .delete(appointments::delete_appointment),
        )
        .route(
            "/tenants/{tenant}/appointments/{id}/{action}",
            post(appointments::transition_appointment),
        )
        .route("/cron/reminders", post(cron::cron_reminders))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{Datelike, Days, Utc, Weekday};
    use serde_json::{json, Value};
    use slotwise_scheduler::{notify::LogSender, ClientDirectory};
    use tower::ServiceExt;

    const OPERATOR: (&str, &str) = ("authorization", "Bearer op-secret");

    fn app() -> Router {
        let mut config = SlotwiseConfig::default();
        config.gateway.operator_token = Some("op-secret".into());
        config.gateway.cron_token = Some("cron-secret".into());
        let registry = Arc::new(TenantRegistry::in_memory(16, "Europe/Madrid"));
        let notifier = Notifier::new(
            Arc::new(ClientDirectory::new(registry.clone())),
            Arc::new(LogSender),
        );
        let sweeper = Arc::new(ReminderSweeper::new(notifier.clone()));
        build_router(Arc::new(AppState::new(config, registry, notifier, sweeper)))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// A Monday one to two weeks out, as a Madrid local date.
    fn next_monday() -> String {
        let today = Utc::now()
            .with_timezone(&chrono_tz::Europe::Madrid)
            .date_naive();
        let mut day = today + Days::new(7);
        while day.weekday() != Weekday::Mon {
            day = day + Days::new(1);
        }
        day.format("%Y-%m-%d").to_string()
    }

    async fn configured_tenant(app: &Router) {
        let (status, _) = call(
            app,
            "PUT",
            "/tenants/acme/settings/legacy",
            &[OPERATOR],
            Some(json!({"timezone": "Europe/Madrid"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(
            app,
            "PUT",
            "/tenants/acme/services/cut",
            &[OPERATOR],
            Some(json!({"name": "Cut", "price_cents": 1500, "duration": 60, "duration_unit": "minutes"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call(&app(), "GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["notifications"], "log");
    }

    #[tokio::test]
    async fn settings_are_operator_only_and_start_unconfigured() {
        let app = app();
        let (status, body) = call(&app, "GET", "/tenants/acme/settings", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configured"], false);

        let policy = body["policy"].clone();
        let (status, _) = call(
            &app,
            "PUT",
            "/tenants/acme/settings",
            &[("x-subject-id", "ana")],
            Some(policy.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            call(&app, "PUT", "/tenants/acme/settings", &[OPERATOR], Some(policy)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "GET", "/tenants/acme/settings", &[], None).await;
        assert_eq!(body["configured"], true);
        assert_eq!(body["policy"]["timezone"], "Europe/Madrid");
    }

    #[tokio::test]
    async fn invalid_tenant_name_is_rejected() {
        let (status, body) = call(&app(), "GET", "/tenants/a.b/settings", &[], None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TENANT");
    }

    #[tokio::test]
    async fn booking_without_policy_is_config_missing() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/tenants/acme/appointments",
            &[("x-subject-id", "ana")],
            Some(json!({"service_ids": ["cut"], "date": next_monday(), "time": "10:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "CONFIG_MISSING");
    }

    #[tokio::test]
    async fn client_booking_lifecycle() {
        let app = app();
        configured_tenant(&app).await;
        let date = next_monday();

        let (status, body) = call(
            &app,
            "POST",
            "/tenants/acme/appointments",
            &[("x-subject-id", "ana")],
            Some(json!({"service_ids": ["cut"], "date": date, "time": "10:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["appointment"]["status"], "pending");
        assert_eq!(body["appointment"]["total_price_cents"], 1500);
        let id = body["appointment"]["id"].as_str().unwrap().to_string();

        // Same slot, capacity one.
        let (status, body) = call(
            &app,
            "POST",
            "/tenants/acme/appointments",
            &[("x-subject-id", "bea")],
            Some(json!({"service_ids": ["cut"], "date": date, "time": "10:30"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NO_CAPACITY");

        let (status, body) = call(
            &app,
            "POST",
            "/tenants/acme/appointments",
            &[("x-subject-id", "bea")],
            Some(json!({"service_ids": ["cut"], "date": date, "time": "11:15"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISALIGNED");

        let uri = format!("/tenants/acme/appointments/{id}");
        let (status, _) = call(&app, "GET", &uri, &[("x-subject-id", "bea")], None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "POST",
            &format!("{uri}/confirm"),
            &[("x-subject-id", "ana")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "POST", &format!("{uri}/confirm"), &[OPERATOR], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["appointment"]["status"], "confirmed");

        let (status, body) = call(
            &app,
            "POST",
            &format!("{uri}/cancel"),
            &[("x-subject-id", "ana")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["appointment"]["status"], "cancelled");

        let (status, body) = call(
            &app,
            "GET",
            "/tenants/acme/appointments?status=cancelled",
            &[("x-subject-id", "ana")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, _) = call(&app, "POST", &format!("{uri}/archive"), &[OPERATOR], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cron_requires_token_and_tenant() {
        let app = app();
        let (status, _) = call(&app, "POST", "/cron/reminders", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/cron/reminders",
            &[("x-cron-token", "wrong"), ("x-tenant-id", "acme")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/cron/reminders",
            &[("x-cron-token", "cron-secret")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/cron/reminders",
            &[("x-cron-token", "cron-secret"), ("x-tenant-id", "acme")],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["sent"], 0);
    }

    #[tokio::test]
    async fn forced_cron_sweep_sends_each_offset_once() {
        let app = app();
        configured_tenant(&app).await;
        let (status, _) = call(
            &app,
            "PUT",
            "/tenants/acme/clients/ana",
            &[("x-subject-id", "ana")],
            Some(json!({"name": "Ana", "email": "ana@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(
            &app,
            "POST",
            "/tenants/acme/appointments",
            &[OPERATOR],
            Some(json!({"subject_id": "ana", "service_ids": ["cut"], "date": next_monday(), "time": "09:00"})),
        )
        .await;
        assert_eq!(body["appointment"]["status"], "confirmed");
        let id = body["appointment"]["id"].clone();

        let headers = [("x-cron-token", "cron-secret"), ("x-tenant-id", "acme")];
        let trigger = json!({"force_all": true, "appointment_id": id});
        let (status, body) =
            call(&app, "POST", "/cron/reminders", &headers, Some(trigger.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checked"], 1);
        assert_eq!(body["sent"], 2);

        let (_, body) = call(&app, "POST", "/cron/reminders", &headers, Some(trigger)).await;
        assert_eq!(body["sent"], 0);
    }
}

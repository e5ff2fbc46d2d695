use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use license_intake::{api_router, ServiceState};
use serde_json::json;

/// The `/api` surface plus liveness, readiness, and metrics endpoints.
pub(crate) fn with_service_routes(services: ServiceState, body_limit: usize) -> Router {
    api_router(services, body_limit)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_services;
    use axum::body::Body;
    use axum::http::Request;
    use license_intake::config::{
        AppConfig, AppEnvironment, AuthConfig, DatabaseBackend, DatabaseConfig, MailBackend,
        MailConfig, ServerConfig, StorageBackend, StorageConfig, TelemetryConfig,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_request_bytes: 1024 * 1024,
            },
            telemetry: TelemetryConfig {
                log_level: "warn".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "routes-test-secret".to_string(),
                token_ttl_hours: 1,
                bootstrap_username: "admin".to_string(),
                bootstrap_email: "admin@learnerlicense.com".to_string(),
                bootstrap_password: "admin123".to_string(),
                frontend_url: "http://localhost:5173".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                root: "./uploads".into(),
                public_base_url: "http://localhost:3000/uploads".to_string(),
                timeout: Duration::from_secs(1),
            },
            database: DatabaseConfig {
                backend: DatabaseBackend::Memory,
                path: "./data/license-intake.db".into(),
            },
            mail: MailConfig {
                backend: MailBackend::Log,
                smtp_host: None,
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                from: "noreply@learnerlicense.com".to_string(),
                admin_to: "admin@learnerlicense.com".to_string(),
                timeout: Duration::from_secs(1),
            },
        }
    }

    async fn app(ready: bool) -> (Router, Arc<AtomicBool>) {
        let config = test_config();
        let readiness = Arc::new(AtomicBool::new(ready));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let services = build_services(&config).await.expect("services build");
        let router = with_service_routes(services, config.server.max_request_bytes)
            .layer(Extension(state));
        (router, readiness)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _) = app(false).await;
        let response = router.oneshot(get_request("/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let (router, readiness) = app(false).await;
        let response = router
            .clone()
            .oneshot(get_request("/ready"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "initializing");

        readiness.store(true, Ordering::Release);
        let response = router.oneshot(get_request("/ready")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn metrics_use_prometheus_text_format() {
        let (router, _) = app(true).await;
        let response = router.oneshot(get_request("/metrics")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn api_routes_are_mounted() {
        let (router, _) = app(true).await;
        let response = router
            .clone()
            .oneshot(get_request("/api/submissions/check/LL-20250101-ABCDEF"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(get_request("/api/admin/dashboard"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

use crate::cli::ServeArgs;
use crate::infra::{bootstrap_admin, build_services, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use license_intake::config::{AppConfig, StorageBackend};
use license_intake::error::AppError;
use license_intake::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.storage.backend == StorageBackend::Filesystem {
        tokio::fs::create_dir_all(&config.storage.root).await?;
    }

    let services = build_services(&config).await?;
    bootstrap_admin(&services, &config).await?;

    let app = with_service_routes(services, config.server.max_request_bytes)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        storage = ?config.storage.backend,
        database = ?config.database.backend,
        mail = ?config.mail.backend,
        "learner license intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

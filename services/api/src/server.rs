use crate::cli::ServeArgs;
use crate::infra::{AppState, SessionRegistry};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_flow::config::AppConfig;
use loan_flow::error::AppError;
use loan_flow::telemetry;
use loan_flow::{NetworkStatusObserver, SessionDependencies};
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let deps = SessionDependencies::simulated(&config.engine, NetworkStatusObserver::default());
    let registry = SessionRegistry::new(deps);

    let app = with_application_routes(registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sync_latency_ms = config.engine.sync_latency.as_millis() as u64,
        poll_interval_ms = config.engine.task_poll_interval.as_millis() as u64,
        file_storage = config.engine.storage_dir.is_some(),
        "loan application engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

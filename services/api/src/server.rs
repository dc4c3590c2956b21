use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryPark};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use parkpass::config::AppConfig;
use parkpass::enrollment::EnrollmentService;
use parkpass::error::AppError;
use parkpass::telemetry;
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

    let park = Arc::new(InMemoryPark::seeded());
    let service = Arc::new(EnrollmentService::with_policy(
        park.clone(),
        park.clone(),
        park.clone(),
        config.enrollment.policy(),
    ));

    let app = with_enrollment_routes(service)
        .layer(Extension(app_state))
        .layer(Extension(park))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "park enrollment service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

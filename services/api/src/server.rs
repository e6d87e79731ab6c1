use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState, TracingNotificationPublisher};
use crate::routes::with_deal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dealflow::config::AppConfig;
use dealflow::error::AppError;
use dealflow::telemetry;
use dealflow::workflows::deals::{DealWorkflowService, InMemoryDealRepository};
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
    if let Some(path) = args.policy_catalog.take() {
        config.incentives.policy_catalog = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(load_catalog(&config.incentives)?);
    let repository = Arc::new(InMemoryDealRepository::default());
    let publisher = Arc::new(TracingNotificationPublisher::default());
    let tie_break = config.incentives.tie_break;
    let deal_service = Arc::new(DealWorkflowService::new(
        repository,
        catalog,
        publisher,
        config.incentives.clone(),
    ));

    let app = with_deal_routes(deal_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        tie_break = tie_break.label(),
        currency = %config.incentives.default_currency,
        "dealflow service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

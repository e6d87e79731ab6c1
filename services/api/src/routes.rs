use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use dealflow::workflows::deals::{
    deal_router, DealRepository, DealWorkflowService, NotificationPublisher, PolicyStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_deal_routes<R, P, N>(service: Arc<DealWorkflowService<R, P, N>>) -> axum::Router
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    deal_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
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
    use crate::infra::{load_catalog, TracingNotificationPublisher};
    use axum::body::Body;
    use axum::http::Request;
    use dealflow::config::IncentiveConfig;
    use dealflow::workflows::deals::InMemoryDealRepository;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let catalog = load_catalog(&IncentiveConfig::default()).expect("catalog loads");
        let service = Arc::new(DealWorkflowService::new(
            Arc::new(InMemoryDealRepository::default()),
            Arc::new(catalog),
            Arc::new(TracingNotificationPublisher::default()),
            IncentiveConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_deal_routes(service).layer(Extension(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_tracks_listener_state() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unconfigured_service_pays_the_default_tiered_commission() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/deals")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-actor-id", "rep-1")
                    .header("x-actor-role", "sales")
                    .body(Body::from(r#"{"title":"Seats","amount":"600000"}"#))
                    .expect("request"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = body_json(response).await;
        assert_eq!(payload["incentive"], "60000.00");
        assert_eq!(payload["policy_id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn summary_starts_empty() {
        let response = app(true)
            .oneshot(
                Request::get("/api/v1/payouts/summary")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["pending_count"], 0);
        assert_eq!(payload["total_paid"], "0.00");
    }
}

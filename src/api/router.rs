use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::api::{attempts, exams, handlers, questions};
use crate::core::{config::CorsSettings, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let api_v1 = Router::new()
        .nest("/questions", questions::router())
        .nest("/exams", exams::router())
        .nest("/attempts", attempts::router());

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&settings.api().api_v1_str, api_v1);

    if settings.telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    });

    router
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors_layer(settings.cors()))
        .with_state(state)
}

/// Counts requests and records latency per matched route template, so
/// attempt ids never end up as label values.
async fn track_http_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());

    response
}

fn cors_layer(cors: &CorsSettings) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, ORIGIN, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(600));

    let origins: Vec<HeaderValue> =
        cors.origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok()).collect();
    if origins.is_empty() {
        // Credentials cannot be combined with a wildcard origin.
        return base.allow_origin(Any);
    }
    base.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, Method, StatusCode};
    use tower::ServiceExt;

    use super::router;
    use crate::core::state::AppState;
    use crate::core::{config::Settings, metrics};
    use crate::store::MemoryStore;
    use crate::test_support::{self, send_json};

    #[tokio::test]
    async fn root_reports_service_and_backend() {
        let ctx = test_support::setup_test_context().await;

        let (status, body) = send_json(&ctx.app, Method::GET, "/", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Academia CBT");
        assert_eq!(body["store_backend"], "memory");
    }

    #[tokio::test]
    async fn healthz_pings_store() {
        let ctx = test_support::setup_test_context().await;

        let (status, body) = send_json(&ctx.app, Method::GET, "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["memory"], "healthy");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::HEAD, "/healthz", None, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let ctx = test_support::setup_test_context().await;

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, "/healthz", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn metrics_route_follows_settings() {
        let ctx = test_support::setup_test_context().await;
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, "/metrics", None, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        std::env::set_var("PROMETHEUS_ENABLED", "1");
        let settings = Settings::load().expect("settings");
        metrics::init(&settings).expect("metrics init");
        let app = router(AppState::new(settings, Arc::new(MemoryStore::new())));

        let response = app
            .oneshot(test_support::json_request(Method::GET, "/metrics", None, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
        store_backend: state.store().backend().to_string(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut components = HashMap::new();
    let backend = state.store().backend();

    let (code, status) = match state.store().ping().await {
        Ok(()) => {
            components.insert(backend.to_string(), "healthy".to_string());
            (StatusCode::OK, "healthy")
        }
        Err(err) => {
            tracing::error!(error = %err, backend, "Store health check failed");
            components.insert(backend.to_string(), format!("unhealthy: {err}"));
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        code,
        Json(HealthResponse {
            service: "academia-cbt".to_string(),
            status: status.to_string(),
            components,
        }),
    )
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let broker = if state.rabbitmq.is_connected() {
        Ok(())
    } else {
        Err("channel closed".to_string())
    };
    let checks = vec![
        HealthCheck::from_result("database", db::ping(&state.db)),
        HealthCheck::from_result("rabbitmq", broker),
    ];

    let response = HealthResponse::healthy("amora-discovery", env!("CARGO_PKG_VERSION")).with_checks(checks);
    let status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::AppResult;
use amora_shared::types::api::ApiResponse;
use amora_shared::types::auth::AuthUser;

use crate::models::Report;
use crate::services::moderation_service::{self, PgModerationStore};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub reported_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

// --- POST /reports ---

pub async fn create_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Report>>)> {
    let valid = moderation_service::validate_report(user.id, req.reported_id, &req.reason, req.details.as_deref())?;

    let mut conn = db::conn(&state.db)?;
    let report = moderation_service::create_report(&mut PgModerationStore::new(&mut conn), user.id, req.reported_id, valid)?;

    metrics::counter!("reports_created_total", "reason" => report.reason.clone()).increment(1);
    tracing::info!(report_id = %report.id, reporter_id = %user.id, reported_id = %report.reported_id, "report created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(report))))
}

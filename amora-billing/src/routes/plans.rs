use axum::Json;

use amora_shared::types::ApiResponse;

use crate::services::plans::{Plan, PLANS};

// --- GET /plans ---

pub async fn list_plans() -> Json<ApiResponse<Vec<Plan>>> {
    Json(ApiResponse::ok(PLANS.to_vec()))
}

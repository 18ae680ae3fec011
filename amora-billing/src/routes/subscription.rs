use axum::extract::State;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::entitlement::{self, Entitlement};
use amora_shared::errors::AppResult;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::AppState;

// --- GET /subscription ---

pub async fn get_subscription(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Entitlement>>> {
    let mut conn = db::conn(&state.db)?;
    let current = entitlement::db::load(&mut conn, user.id, Utc::now(), &state.config.quota)?;
    Ok(Json(ApiResponse::ok(current)))
}

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::errors::AppResult;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::schema::refresh_tokens;
use crate::services::token_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    /// Revoke every session of the caller, not only this device.
    #[serde(default)]
    pub all_devices: bool,
}

// --- POST /logout ---

pub async fn logout(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let mut conn = db::conn(&state.db)?;
    let now = Utc::now();

    let owned_open = refresh_tokens::table
        .filter(refresh_tokens::credential_id.eq(user.id))
        .filter(refresh_tokens::revoked_at.is_null());

    let revoked = match (req.all_devices, req.refresh_token.as_deref()) {
        (false, Some(token)) => diesel::update(
            owned_open.filter(refresh_tokens::token_hash.eq(token_service::hash_token(token))),
        )
        .set(refresh_tokens::revoked_at.eq(Some(now)))
        .execute(&mut conn)?,
        _ => diesel::update(owned_open)
            .set(refresh_tokens::revoked_at.eq(Some(now)))
            .execute(&mut conn)?,
    };

    tracing::info!(user_id = %user.id, revoked, all_devices = req.all_devices, "logged out");

    Ok(Json(ApiResponse::ok("logged out")))
}

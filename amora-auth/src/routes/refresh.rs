use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::{TokenPair, UserRole};
use amora_shared::types::ApiResponse;

use crate::models::{Credential, RefreshToken};
use crate::schema::{credentials, refresh_tokens};
use crate::services::token_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Rotate: the presented refresh token is revoked and a new pair issued.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let token_hash = token_service::hash_token(&req.refresh_token);
    let mut conn = db::conn(&state.db)?;

    let token_pair = conn.transaction::<_, AppError, _>(|conn| {
        let stored: RefreshToken = refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(&token_hash))
            .filter(refresh_tokens::revoked_at.is_null())
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "invalid refresh token"))?;

        if stored.expires_at < chrono::Utc::now() {
            return Err(AppError::new(ErrorCode::TokenExpired, "refresh token expired"));
        }

        diesel::update(refresh_tokens::table.filter(refresh_tokens::id.eq(stored.id)))
            .set(refresh_tokens::revoked_at.eq(Some(chrono::Utc::now())))
            .execute(conn)?;

        let credential: Credential = credentials::table
            .find(stored.credential_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials, "account no longer exists"))?;
        let role = credential.role.parse::<UserRole>().unwrap_or(UserRole::User);

        crate::routes::login::issue_session(&state, conn, credential.id, role)
    })?;

    Ok(Json(ApiResponse::ok(token_pair)))
}

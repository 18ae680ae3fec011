use axum::extract::State;
use axum::Json;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::{TokenPair, UserRole};
use amora_shared::types::ApiResponse;
use uuid::Uuid;

use crate::models::{Credential, NewRefreshToken};
use crate::schema::{credentials, refresh_tokens};
use crate::services::{auth_service, token_service};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let mut conn = db::conn(&state.db)?;

    let credential: Credential = credentials::table
        .filter(credentials::email.eq(auth_service::normalize_email(&req.email)))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials, "invalid email or password"))?;

    if !auth_service::verify_password(&req.password, &credential.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, "invalid email or password"));
    }

    let role = credential.role.parse::<UserRole>().unwrap_or(UserRole::User);
    let token_pair = issue_session(&state, &mut conn, credential.id, role)?;

    tracing::info!(user_id = %credential.id, "user logged in");

    Ok(Json(ApiResponse::ok(token_pair)))
}

/// Sign an access token and persist the hash of a fresh refresh token.
pub fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    user_id: Uuid,
    role: UserRole,
) -> AppResult<TokenPair> {
    let (token_pair, refresh_hash) = token_service::create_token_pair(
        user_id,
        role,
        &state.config.jwt_secret,
        state.config.jwt_access_ttl,
    )?;

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            credential_id: user_id,
            token_hash: refresh_hash,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(state.config.jwt_refresh_ttl),
        })
        .execute(conn)?;

    Ok(token_pair)
}

use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::{TokenPair, UserRole};
use amora_shared::types::ApiResponse;

use crate::models::{Credential, NewCredential};
use crate::schema::credentials;
use crate::services::auth_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub password: String,
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    auth_service::validate_password(&req.password)?;

    let email = auth_service::normalize_email(&req.email);
    let password_hash = auth_service::hash_password(&req.password)?;
    let mut conn = db::conn(&state.db)?;

    // The unique index on email settles concurrent signups
    let inserted = diesel::insert_into(credentials::table)
        .values(&NewCredential { email, password_hash })
        .on_conflict(credentials::email)
        .do_nothing()
        .get_result::<Credential>(&mut conn)
        .optional()?;

    let Some(credential) = inserted else {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
    };

    let token_pair = crate::routes::login::issue_session(&state, &mut conn, credential.id, UserRole::User)?;

    crate::events::publisher::publish_user_registered(&state.rabbitmq, credential.id, &credential.email).await;
    metrics::counter!("signups_total").increment(1);

    tracing::info!(user_id = %credential.id, "user registered");

    Ok(Json(ApiResponse::ok(token_pair)))
}

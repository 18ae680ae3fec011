use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::routes::photos::read_image;
use crate::schema::profiles;
use crate::services::profile_service;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub verification_status: String,
}

// --- POST /verification ---

/// Selfie upload. Goes straight to the manual review queue in moderation.
pub async fn submit_verification(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<VerificationResponse>>> {
    {
        let mut conn = db::conn(&state.db)?;
        let profile = profile_service::ensure_profile(&mut conn, user.id)?;
        match profile.verification_status.as_str() {
            "pending" => {
                return Err(AppError::new(
                    ErrorCode::VerificationAlreadyPending,
                    "a verification request is already pending",
                ))
            }
            "verified" => return Err(AppError::bad_request("profile is already verified")),
            _ => {}
        }
    }

    let image = read_image(&mut multipart).await?;
    let key = format!("verification/{}/{}.{}", user.id, Uuid::now_v7(), image.extension);
    let selfie_url = state
        .storage
        .upload(&key, image.data, &image.content_type)
        .await
        .map_err(|e| AppError::new(ErrorCode::PhotoUploadFailed, e))?;

    let mut conn = db::conn(&state.db)?;
    let updated = diesel::update(
        profiles::table
            .find(user.id)
            .filter(profiles::verification_status.ne_all(vec!["pending", "verified"])),
    )
    .set((
        profiles::verification_status.eq("pending"),
        profiles::verification_photo_url.eq(&selfie_url),
        profiles::verification_note.eq(None::<String>),
        profiles::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)?;

    if updated == 0 {
        if let Err(e) = state.storage.delete(&key).await {
            tracing::warn!(error = %e, key = %key, "failed to remove duplicate selfie");
        }
        return Err(AppError::new(
            ErrorCode::VerificationAlreadyPending,
            "a verification request is already pending",
        ));
    }

    tracing::info!(user_id = %user.id, "verification selfie submitted");

    Ok(Json(ApiResponse::ok(VerificationResponse {
        verification_status: "pending".to_string(),
    })))
}

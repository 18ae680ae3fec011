use axum::extract::{Path, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::models::{Profile, ProfileCard, UpdateProfile};
use crate::schema::profiles;
use crate::services::profile_service;
use crate::services::swipe_service::{self, PgSwipeStore};
use crate::AppState;

// --- GET /me ---

pub async fn get_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = db::conn(&state.db)?;
    // Covers a login that beats the user.registered consumer
    let profile = profile_service::ensure_profile(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- PATCH /me ---

pub async fn update_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(mut payload): Json<UpdateProfile>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    if let Some(bio) = &payload.bio {
        profile_service::validate_bio(bio)?;
    }
    if let Some(gender) = &payload.gender {
        profile_service::validate_gender(gender)?;
    }
    if let Some(looking_for) = &payload.looking_for {
        payload.looking_for = Some(profile_service::validate_looking_for(looking_for)?);
    }

    let mut conn = db::conn(&state.db)?;
    profile_service::ensure_profile(&mut conn, user.id)?;

    let updated = diesel::update(profiles::table.find(user.id))
        .set((&payload, profiles::updated_at.eq(Utc::now())))
        .get_result::<Profile>(&mut conn)?;

    tracing::info!(user_id = %user.id, "profile updated");

    Ok(Json(ApiResponse::ok(updated)))
}

// --- DELETE /me ---

/// Soft delete: the row stays for matches, reports and audit, it just leaves
/// discovery.
pub async fn hide_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let mut conn = db::conn(&state.db)?;
    profile_service::find_profile(&mut conn, user.id)?;

    let hidden = diesel::update(profiles::table.find(user.id))
        .set((profiles::is_visible.eq(false), profiles::updated_at.eq(Utc::now())))
        .get_result::<Profile>(&mut conn)?;

    tracing::info!(user_id = %user.id, "profile hidden");

    Ok(Json(ApiResponse::ok_with_message(hidden, "profile hidden")))
}

// --- POST /onboarding ---

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub display_name: String,
    pub birth_date: String,
    pub gender: String,
    pub looking_for: Vec<String>,
    pub bio: Option<String>,
}

pub async fn complete_onboarding(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<OnboardingRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let display_name = profile_service::validate_display_name(&req.display_name)?;
    let birth_date = NaiveDate::parse_from_str(&req.birth_date, "%Y-%m-%d")
        .map_err(|_| AppError::new(ErrorCode::ValidationError, "invalid birth_date format, expected YYYY-MM-DD"))?;
    profile_service::validate_birth_date(birth_date, Utc::now().date_naive())?;
    profile_service::validate_gender(&req.gender)?;
    let looking_for = profile_service::validate_looking_for(&req.looking_for)?;
    if let Some(bio) = &req.bio {
        profile_service::validate_bio(bio)?;
    }

    let mut conn = db::conn(&state.db)?;
    profile_service::ensure_profile(&mut conn, user.id)?;

    let updated = diesel::update(profiles::table.find(user.id))
        .set((
            profiles::display_name.eq(&display_name),
            profiles::birth_date.eq(birth_date),
            profiles::gender.eq(&req.gender),
            profiles::looking_for.eq(&looking_for),
            profiles::bio.eq(&req.bio),
            profiles::is_profile_complete.eq(true),
            profiles::updated_at.eq(Utc::now()),
        ))
        .get_result::<Profile>(&mut conn)?;

    tracing::info!(user_id = %user.id, display_name = %display_name, "onboarding completed");

    Ok(Json(ApiResponse::ok(updated)))
}

// --- GET /profiles/:id ---

pub async fn get_public_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProfileCard>>> {
    let mut conn = db::conn(&state.db)?;
    let profile = profile_service::find_profile(&mut conn, profile_id)?;

    let matched = swipe_service::is_matched(&mut PgSwipeStore::new(&mut conn), user.id, profile_id)?;
    if !profile_service::is_viewable(&profile, user.id, matched) {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "profile not found"));
    }

    Ok(Json(ApiResponse::ok(ProfileCard::from_profile(profile, Utc::now().date_naive()))))
}

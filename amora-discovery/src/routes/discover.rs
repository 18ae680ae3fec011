use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::models::{Profile, ProfileCard};
use crate::schema::{profiles, swipes};
use crate::services::profile_service::{self, MAX_AGE, MIN_AGE};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 50;

#[derive(Debug, Deserialize, Default)]
pub struct DiscoverQuery {
    pub limit: Option<i64>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

impl DiscoverQuery {
    /// (limit, min_age, max_age) with defaults applied.
    pub fn resolve(&self) -> AppResult<(i64, u32, u32)> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let min_age = self.min_age.unwrap_or(MIN_AGE).max(MIN_AGE);
        let max_age = self.max_age.unwrap_or(MAX_AGE).min(MAX_AGE);
        if min_age > max_age {
            return Err(AppError::new(ErrorCode::ValidationError, "min_age must not exceed max_age"));
        }
        Ok((limit, min_age, max_age))
    }
}

// --- GET /discover ---

pub async fn discover(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiscoverQuery>,
) -> AppResult<Json<ApiResponse<Vec<ProfileCard>>>> {
    let (limit, min_age, max_age) = query.resolve()?;
    let today = Utc::now().date_naive();
    let (earliest, latest) = profile_service::birth_date_bounds(min_age, max_age, today)
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "age range out of bounds"))?;

    let mut conn = db::conn(&state.db)?;
    let me = profile_service::find_profile(&mut conn, user.id)?;
    if me.is_suspended {
        return Err(AppError::new(ErrorCode::ProfileSuspended, "your profile is suspended"));
    }
    let Some(my_gender) = me.gender.clone().filter(|_| me.is_profile_complete) else {
        return Err(AppError::new(ErrorCode::OnboardingIncomplete, "complete onboarding to start discovering"));
    };

    let already_swiped: Vec<Uuid> = swipes::table
        .filter(swipes::swiper_id.eq(user.id))
        .select(swipes::swiped_id)
        .load(&mut conn)?;

    let candidates = profiles::table
        .filter(profiles::is_visible.eq(true))
        .filter(profiles::is_profile_complete.eq(true))
        .filter(profiles::is_suspended.eq(false))
        .filter(profiles::id.ne(user.id))
        .filter(profiles::id.ne_all(already_swiped))
        .filter(profiles::gender.eq_any(&me.looking_for))
        .filter(profiles::looking_for.contains(vec![my_gender]))
        .filter(profiles::birth_date.between(earliest, latest))
        .order(profiles::updated_at.desc())
        .limit(limit)
        .load::<Profile>(&mut conn)?;

    tracing::debug!(user_id = %user.id, count = candidates.len(), "discovery feed served");

    let cards = candidates
        .into_iter()
        .map(|p| ProfileCard::from_profile(p, today))
        .collect();

    Ok(Json(ApiResponse::ok(cards)))
}

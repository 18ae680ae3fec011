use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::AppResult;
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::models::{Match, Profile, ProfileCard};
use crate::schema::{matches, profiles};
use crate::services::swipe_service::{self, PgSwipeStore};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MatchView {
    pub match_id: Uuid,
    pub matched_at: DateTime<Utc>,
    pub profile: Option<ProfileCard>,
}

// --- GET /matches ---

pub async fn list_matches(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<MatchView>>>> {
    let mut conn = db::conn(&state.db)?;

    let my_matches = matches::table
        .filter(matches::user_a.eq(user.id).or(matches::user_b.eq(user.id)))
        .order(matches::created_at.desc())
        .load::<Match>(&mut conn)?;

    let other_ids: Vec<Uuid> = my_matches.iter().map(|m| m.other_participant(user.id)).collect();
    let mut counterparts: HashMap<Uuid, Profile> = profiles::table
        .filter(profiles::id.eq_any(&other_ids))
        .load::<Profile>(&mut conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let today = Utc::now().date_naive();
    let views = my_matches
        .into_iter()
        .map(|m| {
            let other = m.other_participant(user.id);
            MatchView {
                match_id: m.id,
                matched_at: m.created_at,
                profile: counterparts
                    .remove(&other)
                    .map(|p| ProfileCard::from_profile(p, today)),
            }
        })
        .collect();

    Ok(Json(ApiResponse::ok(views)))
}

#[derive(Debug, Serialize)]
pub struct MatchCheck {
    pub is_match: bool,
}

// --- GET /matches/check/:user_id ---

pub async fn check_match(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(other_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MatchCheck>>> {
    let mut conn = db::conn(&state.db)?;
    let is_match = swipe_service::is_matched(&mut PgSwipeStore::new(&mut conn), user.id, other_id)?;
    Ok(Json(ApiResponse::ok(MatchCheck { is_match })))
}

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::Connection;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::events::publisher;
use crate::services::swipe_service::{self, MatchPair, PgSwipeStore, SwipeDirection, SwipeOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub target_id: Uuid,
    pub direction: String,
}

// --- POST /swipes ---

pub async fn record_swipe(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SwipeRequest>,
) -> AppResult<Json<ApiResponse<SwipeOutcome>>> {
    let direction: SwipeDirection = req.direction.parse()?;
    let policy = state.config.quota;

    let mut conn = db::conn(&state.db)?;
    let outcome = conn.transaction::<_, AppError, _>(|conn| {
        swipe_service::record_swipe(
            &mut PgSwipeStore::new(conn),
            user.id,
            req.target_id,
            direction,
            Utc::now(),
            &policy,
        )
    })?;

    if outcome.recorded {
        metrics::counter!("swipes_recorded_total", "direction" => direction.as_str()).increment(1);
        tracing::info!(
            swiper_id = %user.id,
            swiped_id = %req.target_id,
            direction = direction.as_str(),
            "swipe recorded"
        );
    }

    if let (true, Some(match_id)) = (outcome.match_created, outcome.match_id) {
        metrics::counter!("matches_created_total").increment(1);
        tracing::info!(match_id = %match_id, user_id = %user.id, other_id = %req.target_id, "match created");
        publisher::publish_match_created(&state.rabbitmq, match_id, MatchPair::new(user.id, req.target_id)).await;
    }

    Ok(Json(ApiResponse::ok(outcome)))
}

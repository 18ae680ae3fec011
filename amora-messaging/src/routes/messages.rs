use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::entitlement::Remaining;
use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::pagination::{Paginated, PaginationParams};
use amora_shared::types::ApiResponse;

use crate::events::publisher;
use crate::models::{Match, Message};
use crate::schema::{matches, messages};
use crate::services::message_service::{self, PgMessageStore};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: Message,
    pub messages_remaining: Remaining,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub marked_read: usize,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

fn load_participant_match(conn: &mut diesel::pg::PgConnection, match_id: Uuid, user_id: Uuid) -> AppResult<Match> {
    let found = matches::table.find(match_id).first::<Match>(conn).optional()?;
    message_service::participant_match(found, user_id)
}

// --- GET /matches/:id/messages ---

/// Oldest first within the page; page 1 is the oldest page.
pub async fn list_messages(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Message>>>> {
    let mut conn = db::conn(&state.db)?;
    load_participant_match(&mut conn, match_id, user.id)?;

    let total: i64 = messages::table
        .filter(messages::match_id.eq(match_id))
        .select(count_star())
        .first(&mut conn)?;

    let items = messages::table
        .filter(messages::match_id.eq(match_id))
        .order((messages::created_at.asc(), messages::id.asc()))
        .offset(params.offset())
        .limit(params.limit() as i64)
        .load::<Message>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- POST /matches/:id/messages ---

pub async fn send_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<SendMessageResponse>>> {
    let policy = state.config.quota;
    let mut conn = db::conn(&state.db)?;

    let sent = conn.transaction::<_, AppError, _>(|conn| {
        message_service::send_message(
            &mut PgMessageStore::new(conn),
            user.id,
            match_id,
            &req.content,
            Utc::now(),
            &policy,
        )
    })?;

    metrics::counter!("messages_sent_total").increment(1);
    tracing::info!(
        message_id = %sent.message.id,
        match_id = %match_id,
        sender_id = %user.id,
        "message sent"
    );

    let room = format!("user:{}", sent.recipient_id);
    if let Err(e) = state.io.to(room).emit("new_message", &sent.message) {
        tracing::warn!(error = %e, recipient_id = %sent.recipient_id, "realtime delivery failed");
    }

    publisher::publish_message_sent(&state.rabbitmq, &sent.message, sent.recipient_id).await;

    Ok(Json(ApiResponse::ok(SendMessageResponse {
        message: sent.message,
        messages_remaining: sent.messages_remaining,
    })))
}

// --- POST /matches/:id/read ---

/// Marks the other participant's unread messages as read.
pub async fn mark_as_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReadResponse>>> {
    let mut conn = db::conn(&state.db)?;
    let m = load_participant_match(&mut conn, match_id, user.id)?;
    let other = m.other_participant(user.id);

    let marked_read = diesel::update(
        messages::table
            .filter(messages::match_id.eq(match_id))
            .filter(messages::sender_id.eq(other))
            .filter(messages::is_read.eq(false)),
    )
    .set((messages::is_read.eq(true), messages::read_at.eq(Some(Utc::now()))))
    .execute(&mut conn)?;

    if marked_read > 0 {
        let payload = serde_json::json!({ "match_id": match_id, "reader_id": user.id });
        if let Err(e) = state.io.to(format!("user:{other}")).emit("messages_read", &payload) {
            tracing::debug!(error = %e, "read receipt not delivered");
        }
    }

    Ok(Json(ApiResponse::ok(ReadResponse { marked_read })))
}

// --- GET /unread-count ---

pub async fn get_unread_count(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = db::conn(&state.db)?;

    let match_ids: Vec<Uuid> = matches::table
        .filter(matches::user_a.eq(user.id).or(matches::user_b.eq(user.id)))
        .select(matches::id)
        .load(&mut conn)?;

    let total_unread: i64 = messages::table
        .filter(messages::match_id.eq_any(&match_ids))
        .filter(messages::sender_id.ne(user.id))
        .filter(messages::is_read.eq(false))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { total_unread })))
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::AppResult;
use amora_shared::middleware::decode_access_token;
use amora_shared::types::MessageFeed;

use crate::models::{Match, Message};
use crate::schema::{matches, messages};
use crate::services::message_service;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub match_id: Uuid,
    /// Newest `created_at` the client already holds.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPayload {
    pub match_id: Uuid,
    pub messages: Vec<Message>,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

fn presence_key(user_id: Uuid) -> String {
    format!("online:{user_id}")
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "messaging socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);
    socket.join(format!("user:{user_id}")).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket connected");

    refresh_presence(&state, user_id).await;
    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    socket.on("sync", {
        let state = state.clone();
        move |socket: SocketRef, Data::<SyncRequest>(req)| {
            let state = state.clone();
            async move { on_sync(socket, req, &state).await; }
        }
    });

    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = get_user_id(&socket) {
                    refresh_presence(&state, user_id).await;
                }
            }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = get_user_id(&socket) {
                    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket disconnected");
                    if let Err(e) = state.redis.del(&presence_key(user_id)).await {
                        tracing::debug!(error = %e, "failed to clear presence");
                    }
                }
            }
        }
    });
}

async fn refresh_presence(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.redis.set(&presence_key(user_id), "1", state.config.presence_ttl_secs).await {
        tracing::debug!(error = %e, user_id = %user_id, "failed to refresh presence");
    }
}

/// Reply with the latest page plus everything after `since`. A message sent
/// between the two reads lands in both; the feed keeps one copy.
async fn on_sync(socket: SocketRef, req: SyncRequest, state: &Arc<AppState>) {
    let Some(user_id) = get_user_id(&socket) else {
        return;
    };

    match load_history(state, user_id, &req) {
        Ok(messages) => {
            let _ = socket.emit("history", &HistoryPayload { match_id: req.match_id, messages });
        }
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user_id, match_id = %req.match_id, "sync refused");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: e.code().map(|c| c.code().to_string()).unwrap_or_else(|| "E0001".into()),
                    message: e.to_string(),
                },
            );
        }
    }
}

fn load_history(state: &AppState, user_id: Uuid, req: &SyncRequest) -> AppResult<Vec<Message>> {
    let mut conn = db::conn(&state.db)?;
    let found = matches::table.find(req.match_id).first::<Match>(&mut conn).optional()?;
    message_service::participant_match(found, user_id)?;

    let page = state.config.sync_page_size;
    let latest = messages::table
        .filter(messages::match_id.eq(req.match_id))
        .order((messages::created_at.desc(), messages::id.desc()))
        .limit(page)
        .load::<Message>(&mut conn)?;

    let catch_up = match req.since {
        Some(since) => messages::table
            .filter(messages::match_id.eq(req.match_id))
            .filter(messages::created_at.gt(since))
            .order((messages::created_at.asc(), messages::id.asc()))
            .limit(page)
            .load::<Message>(&mut conn)?,
        None => Vec::new(),
    };

    Ok(merge_history(latest, catch_up))
}

pub fn merge_history(latest: Vec<Message>, catch_up: Vec<Message>) -> Vec<Message> {
    let mut feed = MessageFeed::new();
    feed.merge(latest);
    feed.merge(catch_up);
    feed.into_vec()
}

fn token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token" && !value.is_empty()).then_some(value)
    })
}

fn authenticate_socket(socket: &SocketRef, state: &AppState) -> Result<Uuid, String> {
    let query = socket.req_parts().uri.query().unwrap_or_default();
    let token = token_from_query(query).ok_or_else(|| "missing token query parameter".to_string())?;

    decode_access_token(token, &state.config.jwt_secret)
        .map(|claims| claims.sub)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(at: DateTime<Utc>, content: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            match_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            content: content.into(),
            is_read: false,
            read_at: None,
            created_at: at,
        }
    }

    #[test]
    fn overlapping_reads_keep_one_copy_in_order() {
        let t0 = Utc::now();
        let first = message(t0, "first");
        let second = message(t0 + Duration::seconds(1), "second");
        let third = message(t0 + Duration::seconds(2), "third");

        // newest-first page from the history read, ascending catch-up after it
        let latest = vec![third.clone(), second.clone(), first.clone()];
        let catch_up = vec![second.clone(), third.clone()];

        let merged = merge_history(latest, catch_up);
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn later_copy_of_a_message_wins() {
        let t0 = Utc::now();
        let unread = message(t0, "hi");
        let mut read = unread.clone();
        read.is_read = true;

        let merged = merge_history(vec![unread], vec![read]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_read);
    }

    #[test]
    fn token_is_read_from_query_string() {
        assert_eq!(token_from_query("EIO=4&token=abc.def&transport=websocket"), Some("abc.def"));
        assert_eq!(token_from_query("EIO=4&transport=websocket"), None);
        assert_eq!(token_from_query("token="), None);
    }
}

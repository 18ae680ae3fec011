//! Sending a chat message: participant check, suspension check and the
//! message quota, with the quota charge and the insert in one transaction.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use amora_shared::entitlement::{self, Entitlement, QuotaAction, QuotaPolicy, Remaining};
use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Match, Message, NewMessage};
use crate::schema::{matches, messages, profiles};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Trimmed content, 1..=2000 characters.
pub fn validate_content(content: &str) -> AppResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::new(ErrorCode::MessageEmpty, "message cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::new(
            ErrorCode::MessageTooLong,
            format!("message must be at most {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    Ok(content)
}

/// The match if `user_id` takes part in it.
pub fn participant_match(found: Option<Match>, user_id: Uuid) -> AppResult<Match> {
    let m = found.ok_or_else(|| AppError::new(ErrorCode::MatchNotFound, "match not found"))?;
    if !m.has_participant(user_id) {
        return Err(AppError::new(ErrorCode::NotMatchParticipant, "you are not part of this match"));
    }
    Ok(m)
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: Message,
    pub recipient_id: Uuid,
    pub messages_remaining: Remaining,
}

pub trait MessageStore {
    fn find_match(&mut self, match_id: Uuid) -> AppResult<Option<Match>>;
    fn is_suspended(&mut self, user_id: Uuid) -> AppResult<bool>;
    fn lock_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> AppResult<Entitlement>;
    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()>;
    fn insert_message(&mut self, match_id: Uuid, sender_id: Uuid, content: &str) -> AppResult<Message>;
}

/// Run inside one transaction so a refused or failed insert spends nothing.
pub fn send_message<S: MessageStore>(
    store: &mut S,
    sender_id: Uuid,
    match_id: Uuid,
    content: &str,
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> AppResult<SentMessage> {
    let content = validate_content(content)?;
    let m = participant_match(store.find_match(match_id)?, sender_id)?;

    if store.is_suspended(sender_id)? {
        return Err(AppError::new(ErrorCode::ProfileSuspended, "your profile is suspended"));
    }

    let mut entitlement = store.lock_entitlement(sender_id, now, policy)?;
    let messages_remaining = entitlement.charge(QuotaAction::Message, policy)?;
    let message = store.insert_message(m.id, sender_id, content)?;
    store.save_entitlement(&entitlement)?;

    Ok(SentMessage {
        recipient_id: m.other_participant(sender_id),
        message,
        messages_remaining,
    })
}

/// Short preview for event payloads and notifications.
pub fn preview(content: &str) -> String {
    const PREVIEW_CHARS: usize = 80;
    let mut out: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

// --- Postgres ---

pub struct PgMessageStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgMessageStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl MessageStore for PgMessageStore<'_> {
    fn find_match(&mut self, match_id: Uuid) -> AppResult<Option<Match>> {
        Ok(matches::table.find(match_id).first::<Match>(self.conn).optional()?)
    }

    fn is_suspended(&mut self, user_id: Uuid) -> AppResult<bool> {
        let suspended = profiles::table
            .find(user_id)
            .select(profiles::is_suspended)
            .first::<bool>(self.conn)
            .optional()?;
        Ok(suspended.unwrap_or(false))
    }

    fn lock_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> AppResult<Entitlement> {
        Ok(entitlement::db::lock_for_update(self.conn, user_id, now, policy)?)
    }

    fn save_entitlement(&mut self, entitlement: &Entitlement) -> AppResult<()> {
        Ok(entitlement::db::save(self.conn, entitlement)?)
    }

    fn insert_message(&mut self, match_id: Uuid, sender_id: Uuid, content: &str) -> AppResult<Message> {
        Ok(diesel::insert_into(messages::table)
            .values(&NewMessage { match_id, sender_id, content })
            .get_result::<Message>(self.conn)?)
    }
}

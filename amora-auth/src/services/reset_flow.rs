//! Password reset by emailed one-time code.
//!
//! `send-otp` stores a hashed 6-digit code, `verify-otp` trades it for a
//! hashed reset token, `reset-password` trades the token for a new password.
//! Codes and tokens are consumed with a conditional update (`used_at IS NULL`),
//! so two concurrent requests cannot both succeed with the same secret.

use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewOtpCode, NewResetToken, OtpCode, ResetToken};
use crate::schema::{credentials, otp_codes, refresh_tokens, reset_tokens};
use crate::services::{auth_service, token_service};

#[derive(Debug, Clone, Copy)]
pub struct ResetPolicy {
    pub otp_ttl: Duration,
    pub reset_token_ttl: Duration,
}

pub trait ResetFlowStore {
    fn find_account(&mut self, email: &str) -> AppResult<Option<Uuid>>;
    fn insert_otp(&mut self, otp: NewOtpCode) -> AppResult<()>;
    /// Newest unused code for the account whose hash matches, expired or not.
    fn find_open_otp(&mut self, credential_id: Uuid, code_hash: &str) -> AppResult<Option<OtpCode>>;
    /// Set `used_at` only if still unset. False when someone else got there first.
    fn consume_otp(&mut self, otp_id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;
    fn insert_reset_token(&mut self, token: NewResetToken) -> AppResult<()>;
    fn find_reset_token(&mut self, token_hash: &str) -> AppResult<Option<ResetToken>>;
    fn consume_reset_token(&mut self, token_id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;
    fn update_password(&mut self, credential_id: Uuid, password_hash: &str, now: DateTime<Utc>) -> AppResult<()>;
    fn revoke_refresh_tokens(&mut self, credential_id: Uuid, now: DateTime<Utc>) -> AppResult<()>;
}

/// A code ready to be emailed.
#[derive(Debug)]
pub struct IssuedOtp {
    pub credential_id: Uuid,
    pub code: String,
}

/// `None` when no account uses `email`; the caller answers identically either way.
pub fn issue_otp<S: ResetFlowStore>(
    store: &mut S,
    email: &str,
    now: DateTime<Utc>,
    policy: &ResetPolicy,
) -> AppResult<Option<IssuedOtp>> {
    let Some(credential_id) = store.find_account(email)? else {
        return Ok(None);
    };

    let code = auth_service::generate_otp_code();
    store.insert_otp(NewOtpCode {
        credential_id,
        code_hash: token_service::hash_token(&code),
        expires_at: now + policy.otp_ttl,
    })?;

    Ok(Some(IssuedOtp { credential_id, code }))
}

/// Exchange a valid code for a reset token (returned in clear, stored hashed).
pub fn verify_otp<S: ResetFlowStore>(
    store: &mut S,
    email: &str,
    code: &str,
    now: DateTime<Utc>,
    policy: &ResetPolicy,
) -> AppResult<String> {
    let invalid = || AppError::new(ErrorCode::OtpInvalid, "invalid or already used code");

    let credential_id = store.find_account(email)?.ok_or_else(invalid)?;
    let otp = store
        .find_open_otp(credential_id, &token_service::hash_token(code.trim()))?
        .ok_or_else(invalid)?;

    if otp.expires_at <= now {
        return Err(AppError::new(ErrorCode::OtpExpired, "code has expired"));
    }
    if !store.consume_otp(otp.id, now)? {
        return Err(invalid());
    }

    let reset_token = token_service::create_opaque_token();
    store.insert_reset_token(NewResetToken {
        credential_id,
        token_hash: token_service::hash_token(&reset_token),
        expires_at: now + policy.reset_token_ttl,
    })?;

    Ok(reset_token)
}

/// Spend a reset token on a new (already hashed) password. Every refresh token
/// of the account is revoked, signing out other sessions.
pub fn complete_reset<S: ResetFlowStore>(
    store: &mut S,
    reset_token: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> AppResult<Uuid> {
    let invalid = || AppError::new(ErrorCode::ResetTokenInvalid, "invalid or already used reset token");

    let token = store
        .find_reset_token(&token_service::hash_token(reset_token))?
        .ok_or_else(invalid)?;

    if token.used_at.is_some() {
        return Err(invalid());
    }
    if token.expires_at <= now {
        return Err(AppError::new(ErrorCode::ResetTokenExpired, "reset token has expired"));
    }
    if !store.consume_reset_token(token.id, now)? {
        return Err(invalid());
    }

    store.update_password(token.credential_id, password_hash, now)?;
    store.revoke_refresh_tokens(token.credential_id, now)?;

    Ok(token.credential_id)
}

// --- Postgres ---

pub struct PgResetFlowStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgResetFlowStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl ResetFlowStore for PgResetFlowStore<'_> {
    fn find_account(&mut self, email: &str) -> AppResult<Option<Uuid>> {
        Ok(credentials::table
            .filter(credentials::email.eq(email))
            .select(credentials::id)
            .first::<Uuid>(self.conn)
            .optional()?)
    }

    fn insert_otp(&mut self, otp: NewOtpCode) -> AppResult<()> {
        diesel::insert_into(otp_codes::table)
            .values(&otp)
            .execute(self.conn)?;
        Ok(())
    }

    fn find_open_otp(&mut self, credential_id: Uuid, code_hash: &str) -> AppResult<Option<OtpCode>> {
        Ok(otp_codes::table
            .filter(otp_codes::credential_id.eq(credential_id))
            .filter(otp_codes::code_hash.eq(code_hash))
            .filter(otp_codes::used_at.is_null())
            .order(otp_codes::created_at.desc())
            .first::<OtpCode>(self.conn)
            .optional()?)
    }

    fn consume_otp(&mut self, otp_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(
            otp_codes::table
                .filter(otp_codes::id.eq(otp_id))
                .filter(otp_codes::used_at.is_null()),
        )
        .set(otp_codes::used_at.eq(Some(now)))
        .execute(self.conn)?;
        Ok(updated == 1)
    }

    fn insert_reset_token(&mut self, token: NewResetToken) -> AppResult<()> {
        diesel::insert_into(reset_tokens::table)
            .values(&token)
            .execute(self.conn)?;
        Ok(())
    }

    fn find_reset_token(&mut self, token_hash: &str) -> AppResult<Option<ResetToken>> {
        Ok(reset_tokens::table
            .filter(reset_tokens::token_hash.eq(token_hash))
            .first::<ResetToken>(self.conn)
            .optional()?)
    }

    fn consume_reset_token(&mut self, token_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(
            reset_tokens::table
                .filter(reset_tokens::id.eq(token_id))
                .filter(reset_tokens::used_at.is_null()),
        )
        .set(reset_tokens::used_at.eq(Some(now)))
        .execute(self.conn)?;
        Ok(updated == 1)
    }

    fn update_password(&mut self, credential_id: Uuid, password_hash: &str, now: DateTime<Utc>) -> AppResult<()> {
        diesel::update(credentials::table.filter(credentials::id.eq(credential_id)))
            .set((
                credentials::password_hash.eq(password_hash),
                credentials::updated_at.eq(now),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn revoke_refresh_tokens(&mut self, credential_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::credential_id.eq(credential_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(now)))
        .execute(self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        accounts: HashMap<String, Uuid>,
        passwords: HashMap<Uuid, String>,
        otps: Vec<OtpCode>,
        tokens: Vec<ResetToken>,
        revoked: Vec<Uuid>,
    }

    impl MemoryStore {
        fn with_account(email: &str) -> (Self, Uuid) {
            let id = Uuid::new_v4();
            let mut store = Self::default();
            store.accounts.insert(email.to_string(), id);
            store.passwords.insert(id, "old-hash".into());
            (store, id)
        }
    }

    impl ResetFlowStore for MemoryStore {
        fn find_account(&mut self, email: &str) -> AppResult<Option<Uuid>> {
            Ok(self.accounts.get(email).copied())
        }

        fn insert_otp(&mut self, otp: NewOtpCode) -> AppResult<()> {
            let now = Utc::now();
            self.otps.push(OtpCode {
                id: Uuid::new_v4(),
                credential_id: otp.credential_id,
                code_hash: otp.code_hash,
                expires_at: otp.expires_at,
                used_at: None,
                created_at: now,
            });
            Ok(())
        }

        fn find_open_otp(&mut self, credential_id: Uuid, code_hash: &str) -> AppResult<Option<OtpCode>> {
            Ok(self
                .otps
                .iter()
                .rev()
                .find(|o| o.credential_id == credential_id && o.code_hash == code_hash && o.used_at.is_none())
                .cloned())
        }

        fn consume_otp(&mut self, otp_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
            match self.otps.iter_mut().find(|o| o.id == otp_id && o.used_at.is_none()) {
                Some(otp) => {
                    otp.used_at = Some(now);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn insert_reset_token(&mut self, token: NewResetToken) -> AppResult<()> {
            self.tokens.push(ResetToken {
                id: Uuid::new_v4(),
                credential_id: token.credential_id,
                token_hash: token.token_hash,
                expires_at: token.expires_at,
                used_at: None,
                created_at: Utc::now(),
            });
            Ok(())
        }

        fn find_reset_token(&mut self, token_hash: &str) -> AppResult<Option<ResetToken>> {
            Ok(self.tokens.iter().find(|t| t.token_hash == token_hash).cloned())
        }

        fn consume_reset_token(&mut self, token_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
            match self.tokens.iter_mut().find(|t| t.id == token_id && t.used_at.is_none()) {
                Some(token) => {
                    token.used_at = Some(now);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn update_password(&mut self, credential_id: Uuid, password_hash: &str, _now: DateTime<Utc>) -> AppResult<()> {
            self.passwords.insert(credential_id, password_hash.to_string());
            Ok(())
        }

        fn revoke_refresh_tokens(&mut self, credential_id: Uuid, _now: DateTime<Utc>) -> AppResult<()> {
            self.revoked.push(credential_id);
            Ok(())
        }
    }

    fn policy() -> ResetPolicy {
        ResetPolicy {
            otp_ttl: Duration::minutes(10),
            reset_token_ttl: Duration::minutes(10),
        }
    }

    #[test]
    fn unknown_email_issues_nothing() {
        let mut store = MemoryStore::default();
        let issued = issue_otp(&mut store, "ghost@example.com", Utc::now(), &policy()).unwrap();
        assert!(issued.is_none());
        assert!(store.otps.is_empty());
    }

    #[test]
    fn code_is_stored_hashed() {
        let (mut store, id) = MemoryStore::with_account("a@example.com");
        let issued = issue_otp(&mut store, "a@example.com", Utc::now(), &policy()).unwrap().unwrap();
        assert_eq!(issued.credential_id, id);
        assert_ne!(store.otps[0].code_hash, issued.code);
        assert_eq!(store.otps[0].code_hash, token_service::hash_token(&issued.code));
    }

    #[test]
    fn code_works_once() {
        let (mut store, _) = MemoryStore::with_account("a@example.com");
        let now = Utc::now();
        let issued = issue_otp(&mut store, "a@example.com", now, &policy()).unwrap().unwrap();

        let token = verify_otp(&mut store, "a@example.com", &issued.code, now, &policy()).unwrap();
        assert_eq!(token.len(), 64);

        let err = verify_otp(&mut store, "a@example.com", &issued.code, now, &policy()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OtpInvalid));
    }

    #[test]
    fn expired_code_is_rejected() {
        let (mut store, _) = MemoryStore::with_account("a@example.com");
        let issued_at = Utc::now();
        let issued = issue_otp(&mut store, "a@example.com", issued_at, &policy()).unwrap().unwrap();

        let later = issued_at + Duration::minutes(10);
        let err = verify_otp(&mut store, "a@example.com", &issued.code, later, &policy()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OtpExpired));
        assert!(store.otps[0].used_at.is_none());
    }

    #[test]
    fn wrong_code_or_account_is_invalid() {
        let (mut store, _) = MemoryStore::with_account("a@example.com");
        let now = Utc::now();
        let issued = issue_otp(&mut store, "a@example.com", now, &policy()).unwrap().unwrap();
        let wrong = if issued.code == "000000" { "111111" } else { "000000" };

        let err = verify_otp(&mut store, "a@example.com", wrong, now, &policy()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OtpInvalid));

        let err = verify_otp(&mut store, "b@example.com", &issued.code, now, &policy()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OtpInvalid));
    }

    #[test]
    fn reset_token_is_single_use_and_revokes_sessions() {
        let (mut store, id) = MemoryStore::with_account("a@example.com");
        let now = Utc::now();
        let issued = issue_otp(&mut store, "a@example.com", now, &policy()).unwrap().unwrap();
        let token = verify_otp(&mut store, "a@example.com", &issued.code, now, &policy()).unwrap();

        let user = complete_reset(&mut store, &token, "new-hash", now).unwrap();
        assert_eq!(user, id);
        assert_eq!(store.passwords[&id], "new-hash");
        assert_eq!(store.revoked, vec![id]);

        let err = complete_reset(&mut store, &token, "newer-hash", now).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ResetTokenInvalid));
        assert_eq!(store.passwords[&id], "new-hash");
    }

    #[test]
    fn expired_reset_token_is_rejected() {
        let (mut store, id) = MemoryStore::with_account("a@example.com");
        let now = Utc::now();
        let issued = issue_otp(&mut store, "a@example.com", now, &policy()).unwrap().unwrap();
        let token = verify_otp(&mut store, "a@example.com", &issued.code, now, &policy()).unwrap();

        let err = complete_reset(&mut store, &token, "new-hash", now + Duration::minutes(11)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ResetTokenExpired));
        assert_eq!(store.passwords[&id], "old-hash");
        assert!(store.revoked.is_empty());
    }

    #[test]
    fn unknown_reset_token_is_invalid() {
        let mut store = MemoryStore::default();
        let err = complete_reset(&mut store, "deadbeef", "hash", Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ResetTokenInvalid));
    }
}

use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use validator::Validate;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::ApiResponse;

use crate::services::auth_service;
use crate::services::reset_flow::{self, IssuedOtp, PgResetFlowStore, ResetPolicy};
use crate::AppState;

const VERIFY_ATTEMPTS_PER_WINDOW: u64 = 5;

fn policy(state: &AppState) -> ResetPolicy {
    ResetPolicy {
        otp_ttl: chrono::Duration::minutes(state.config.otp_ttl_minutes),
        reset_token_ttl: chrono::Duration::minutes(state.config.reset_token_ttl_minutes),
    }
}

/// Email delivery runs detached, so `send-otp` answers in the same time
/// whether or not an account exists.
fn spawn_delivery<F, Fut>(issued: Option<IssuedOtp>, deliver: F)
where
    F: FnOnce(IssuedOtp) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Some(issued) = issued {
        tokio::spawn(deliver(issued));
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

/// POST /send-otp. The answer is the same whether or not the account exists.
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendOtpRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let email = auth_service::normalize_email(&req.email);

    let rate_key = format!("otp:cooldown:{email}");
    let allowed = state
        .redis
        .set_nx(&rate_key, "1", state.config.otp_cooldown_secs)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "otp cooldown check failed, allowing request");
            true
        });
    if !allowed {
        return Err(AppError::new(ErrorCode::EmailRateLimited, "please wait before requesting a new code"));
    }

    let issued = {
        let mut conn = db::conn(&state.db)?;
        let mut store = PgResetFlowStore::new(&mut conn);
        reset_flow::issue_otp(&mut store, &email, chrono::Utc::now(), &policy(&state))?
    };

    let mailer = state.clone();
    spawn_delivery(issued, move |issued| async move {
        match mailer
            .email
            .send_password_reset_code(&email, &issued.code, mailer.config.otp_ttl_minutes)
            .await
        {
            Ok(()) => tracing::info!(user_id = %issued.credential_id, "password reset code sent"),
            Err(e) => tracing::error!(error = %e, user_id = %issued.credential_id, "failed to send reset code email"),
        }
    });

    Ok(Json(ApiResponse::ok("if an account exists for this email, a code has been sent")))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub reset_token: String,
    pub expires_in: i64,
}

/// POST /verify-otp
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> AppResult<Json<ApiResponse<VerifyOtpResponse>>> {
    let email = auth_service::normalize_email(&req.email);

    // 6 digits are guessable without a cap on attempts
    let attempts_key = format!("otp:attempts:{email}");
    let window = (state.config.otp_ttl_minutes * 60).max(60) as u64;
    let allowed = state
        .redis
        .rate_limit_check(&attempts_key, VERIFY_ATTEMPTS_PER_WINDOW, window)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(AppError::new(ErrorCode::RateLimited, "too many attempts, request a new code later"));
    }

    let mut conn = db::conn(&state.db)?;
    let policy = policy(&state);
    let reset_token = conn.transaction::<_, AppError, _>(|conn| {
        let mut store = PgResetFlowStore::new(conn);
        reset_flow::verify_otp(&mut store, &email, &req.code, chrono::Utc::now(), &policy)
    })?;

    Ok(Json(ApiResponse::ok(VerifyOtpResponse {
        reset_token,
        expires_in: state.config.reset_token_ttl_minutes * 60,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub new_password: String,
}

/// POST /reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    auth_service::validate_password(&req.new_password)?;
    let password_hash = auth_service::hash_password(&req.new_password)?;

    let mut conn = db::conn(&state.db)?;
    let user_id = conn.transaction::<_, AppError, _>(|conn| {
        let mut store = PgResetFlowStore::new(conn);
        reset_flow::complete_reset(&mut store, &req.reset_token, &password_hash, chrono::Utc::now())
    })?;

    tracing::info!(user_id = %user_id, "password reset");

    Ok(Json(ApiResponse::ok("password reset successful")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;
    use uuid::Uuid;

    #[tokio::test]
    async fn reset_email_does_not_hold_the_response() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (sent_tx, sent_rx) = oneshot::channel::<Uuid>();
        let credential_id = Uuid::new_v4();

        spawn_delivery(
            Some(IssuedOtp { credential_id, code: "123456".into() }),
            move |issued| async move {
                let _ = release_rx.await;
                let _ = sent_tx.send(issued.credential_id);
            },
        );

        // Control is back while delivery is still blocked.
        release_tx.send(()).unwrap();
        assert_eq!(sent_rx.await.unwrap(), credential_id);
    }

    #[test]
    fn nothing_is_sent_for_unknown_accounts() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        spawn_delivery(None, move |_| async move { flag.store(true, Ordering::SeqCst) });
        assert!(!called.load(Ordering::SeqCst));
    }
}

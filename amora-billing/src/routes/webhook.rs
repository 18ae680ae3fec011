use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use diesel::Connection;
use serde::Deserialize;
use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::events::publisher;
use crate::services::billing_service::{self, PgBillingStore};
use crate::services::paystack::{self, GatewayTransaction, SIGNATURE_HEADER};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: serde_json::Value,
}

/// Check the signature header against the raw body before anything is parsed.
pub fn authenticate(headers: &HeaderMap, body: &[u8], secret: &str) -> AppResult<()> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !paystack::verify_webhook_signature(secret, body, signature) {
        metrics::counter!("webhooks_rejected_total").increment(1);
        return Err(AppError::new(ErrorCode::InvalidSignature, "invalid webhook signature"));
    }
    Ok(())
}

// --- POST /webhook ---

/// Acknowledged with 200 once authenticated, whatever the event, so the
/// gateway stops redelivering; only processing failures return 5xx.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    authenticate(&headers, &body, &state.config.paystack_secret_key)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("malformed webhook body: {e}")))?;

    if event.event != "charge.success" {
        tracing::debug!(event = %event.event, "webhook event ignored");
        return Ok(StatusCode::OK);
    }

    let reported: GatewayTransaction = serde_json::from_value(event.data)
        .map_err(|e| AppError::bad_request(format!("malformed charge payload: {e}")))?;

    let policy = state.config.quota;
    let mut conn = db::conn(&state.db)?;
    let result = conn.transaction::<_, AppError, _>(|conn| {
        billing_service::apply_verification(&mut PgBillingStore::new(conn), &reported, Utc::now(), &policy)
    });

    match result {
        Ok(outcome) => {
            metrics::counter!("payments_verified_total", "status" => outcome.status.as_str()).increment(1);
            publisher::publish_subscription_activated(&state.rabbitmq, &outcome).await;
            Ok(StatusCode::OK)
        }
        Err(e) if e.code() == Some(ErrorCode::TransactionNotFound) => {
            tracing::warn!(reference = %reported.reference, "webhook for unknown reference");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e),
    }
}

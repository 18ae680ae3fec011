use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult, ErrorCode};
use amora_shared::types::auth::AuthUser;
use amora_shared::types::ApiResponse;

use crate::events::publisher;
use crate::models::Transaction;
use crate::schema::transactions;
use crate::services::billing_service::{self, PgBillingStore, VerificationOutcome};
use crate::services::plans;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct InitializeRequest {
    pub plan_id: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    pub authorization_url: String,
    pub reference: String,
}

// --- POST /initialize ---

pub async fn initialize(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitializeRequest>,
) -> AppResult<Json<ApiResponse<InitializeResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let plan = plans::find_plan(&req.plan_id)?;
    let callback_url = req.callback_url.as_deref().unwrap_or(&state.config.default_callback_url);

    let mut conn = db::conn(&state.db)?;
    let session = billing_service::initialize_checkout(
        state.gateway.as_ref(),
        &mut PgBillingStore::new(&mut conn),
        user.id,
        plan,
        &req.email,
        callback_url,
    )
    .await?;

    tracing::info!(user_id = %user.id, plan_id = %plan.id, reference = %session.reference, "checkout started");

    Ok(Json(ApiResponse::ok(InitializeResponse {
        authorization_url: session.authorization_url,
        reference: session.reference,
    })))
}

// --- GET /verify/:reference ---

pub async fn verify(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> AppResult<Json<ApiResponse<VerificationOutcome>>> {
    {
        let mut conn = db::conn(&state.db)?;
        let owned = transactions::table
            .filter(transactions::reference.eq(&reference))
            .first::<Transaction>(&mut conn)
            .optional()?
            .filter(|tx| tx.user_id == user.id);
        if owned.is_none() {
            return Err(AppError::new(ErrorCode::TransactionNotFound, "transaction not found"));
        }
    }

    let reported = state.gateway.verify(&reference).await.map_err(|e| {
        tracing::error!(error = %e, reference = %reference, "gateway verification failed");
        AppError::new(ErrorCode::PaymentGatewayError, "could not verify payment, try again later")
    })?;
    if reported.reference != reference {
        return Err(AppError::new(ErrorCode::PaymentGatewayError, "gateway returned a different reference"));
    }

    let policy = state.config.quota;
    let mut conn = db::conn(&state.db)?;
    let outcome = conn.transaction::<_, AppError, _>(|conn| {
        billing_service::apply_verification(&mut PgBillingStore::new(conn), &reported, Utc::now(), &policy)
    })?;

    metrics::counter!("payments_verified_total", "status" => outcome.status.as_str()).increment(1);
    publisher::publish_subscription_activated(&state.rabbitmq, &outcome).await;

    Ok(Json(ApiResponse::ok(outcome)))
}

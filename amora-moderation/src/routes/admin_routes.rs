use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use amora_shared::clients::db;
use amora_shared::errors::{AppError, AppResult};
use amora_shared::middleware::AdminUser;
use amora_shared::types::api::ApiResponse;
use amora_shared::types::pagination::{Paginated, PaginationParams};

use crate::events::publisher;
use crate::models::{AdminAction, PendingVerification, Report};
use crate::schema::{admin_actions, profiles, reports, subscriptions};
use crate::services::moderation_service::{self, PgModerationStore, ReviewDecision, STATUS_PENDING};
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ReportFilterParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub status: Option<String>,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl ReportFilterParams {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewReportRequest {
    pub status: String,
    #[serde(default)]
    pub suspend: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct VerificationReviewRequest {
    pub approve: bool,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerificationReviewResponse {
    pub user_id: Uuid,
    pub verification_status: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub pending_reports: i64,
    pub reports_today: i64,
    pub total_profiles: i64,
    pub suspended_profiles: i64,
    pub pending_verifications: i64,
    pub premium_subscribers: i64,
}

// --- GET /admin/reports ---

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<ReportFilterParams>,
) -> AppResult<Json<ApiResponse<Paginated<Report>>>> {
    let mut conn = db::conn(&state.db)?;

    let pagination = params.pagination();
    let offset = pagination.offset();
    let limit = pagination.limit() as i64;

    let mut items_query = reports::table.into_boxed();
    let mut count_query = reports::table.into_boxed();
    if let Some(ref status) = params.status {
        items_query = items_query.filter(reports::status.eq(status.clone()));
        count_query = count_query.filter(reports::status.eq(status.clone()));
    }

    let items = items_query
        .order(reports::created_at.desc())
        .offset(offset)
        .limit(limit)
        .load::<Report>(&mut conn)?;
    let total: i64 = count_query.count().get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &pagination))))
}

// --- PUT /admin/reports/:id/review ---

pub async fn review_report(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(report_id): Path<Uuid>,
    Json(req): Json<ReviewReportRequest>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let decision: ReviewDecision = req.status.parse()?;
    let suspension = moderation_service::review_suspension(decision, req.suspend, req.reason.as_deref())?;
    let admin_id = admin.0.id;

    let mut conn = db::conn(&state.db)?;
    let report = conn.transaction::<_, AppError, _>(|conn| {
        moderation_service::review_report(
            &mut PgModerationStore::new(conn),
            admin_id,
            report_id,
            decision,
            suspension.as_deref(),
            Utc::now(),
        )
    })?;

    metrics::counter!("reports_reviewed_total", "status" => decision.as_str()).increment(1);
    tracing::info!(report_id = %report.id, admin_id = %admin_id, status = decision.as_str(), "report reviewed");

    if let Some(reason) = suspension.as_deref() {
        metrics::counter!("profiles_suspended_total").increment(1);
        publisher::publish_profile_suspended(&state.rabbitmq, report.reported_id, reason, admin_id).await;
    }

    Ok(Json(ApiResponse::ok(report)))
}

// --- POST /admin/users/:id/suspend ---

pub async fn suspend_user(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SuspendRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let reason = moderation_service::validate_suspension_reason(&req.reason)?;
    let admin_id = admin.0.id;

    let mut conn = db::conn(&state.db)?;
    conn.transaction::<_, AppError, _>(|conn| {
        moderation_service::suspend_user(&mut PgModerationStore::new(conn), admin_id, user_id, &reason, Utc::now())
    })?;

    metrics::counter!("profiles_suspended_total").increment(1);
    tracing::info!(user_id = %user_id, admin_id = %admin_id, "profile suspended");
    publisher::publish_profile_suspended(&state.rabbitmq, user_id, &reason, admin_id).await;

    Ok(Json(ApiResponse::ok_with_message((), "user suspended")))
}

// --- DELETE /admin/users/:id/suspend ---

pub async fn reinstate_user(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let admin_id = admin.0.id;

    let mut conn = db::conn(&state.db)?;
    conn.transaction::<_, AppError, _>(|conn| {
        moderation_service::reinstate_user(&mut PgModerationStore::new(conn), admin_id, user_id, Utc::now())
    })?;

    tracing::info!(user_id = %user_id, admin_id = %admin_id, "profile reinstated");
    publisher::publish_profile_reinstated(&state.rabbitmq, user_id, admin_id).await;

    Ok(Json(ApiResponse::ok_with_message((), "user reinstated")))
}

// --- GET /admin/verifications ---

pub async fn list_verifications(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<PendingVerification>>>> {
    let mut conn = db::conn(&state.db)?;

    let items = profiles::table
        .filter(profiles::verification_status.eq(STATUS_PENDING))
        .order(profiles::updated_at.asc())
        .offset(params.offset())
        .limit(params.limit() as i64)
        .select((
            profiles::id,
            profiles::display_name,
            profiles::photos,
            profiles::verification_photo_url,
            profiles::updated_at,
        ))
        .load::<PendingVerification>(&mut conn)?;

    let total: i64 = profiles::table
        .filter(profiles::verification_status.eq(STATUS_PENDING))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

// --- PUT /admin/verifications/:id ---

pub async fn review_verification(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<VerificationReviewRequest>,
) -> AppResult<Json<ApiResponse<VerificationReviewResponse>>> {
    let admin_id = admin.0.id;
    let note = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let mut conn = db::conn(&state.db)?;
    let status = conn.transaction::<_, AppError, _>(|conn| {
        moderation_service::review_verification(
            &mut PgModerationStore::new(conn),
            admin_id,
            user_id,
            req.approve,
            note,
            Utc::now(),
        )
    })?;

    metrics::counter!("verifications_reviewed_total", "status" => status).increment(1);
    tracing::info!(user_id = %user_id, admin_id = %admin_id, status, "verification reviewed");

    Ok(Json(ApiResponse::ok(VerificationReviewResponse {
        user_id,
        verification_status: status.to_string(),
    })))
}

// --- GET /admin/stats ---

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let mut conn = db::conn(&state.db)?;
    let now = Utc::now();

    let pending_reports: i64 = reports::table
        .filter(reports::status.eq(STATUS_PENDING))
        .count()
        .get_result(&mut conn)?;

    let reports_today: i64 = reports::table
        .filter(reports::created_at.ge(now - Duration::hours(24)))
        .count()
        .get_result(&mut conn)?;

    let total_profiles: i64 = profiles::table.count().get_result(&mut conn)?;

    let suspended_profiles: i64 = profiles::table
        .filter(profiles::is_suspended.eq(true))
        .count()
        .get_result(&mut conn)?;

    let pending_verifications: i64 = profiles::table
        .filter(profiles::verification_status.eq(STATUS_PENDING))
        .count()
        .get_result(&mut conn)?;

    let premium_subscribers: i64 = subscriptions::table
        .filter(subscriptions::tier.ne("free"))
        .filter(subscriptions::current_period_end.gt(now))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(DashboardStats {
        pending_reports,
        reports_today,
        total_profiles,
        suspended_profiles,
        pending_verifications,
        premium_subscribers,
    })))
}

// --- GET /admin/audit-log ---

pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<AdminAction>>>> {
    let mut conn = db::conn(&state.db)?;

    let items = admin_actions::table
        .order(admin_actions::created_at.desc())
        .offset(params.offset())
        .limit(params.limit() as i64)
        .load::<AdminAction>(&mut conn)?;

    let total: i64 = admin_actions::table.count().get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

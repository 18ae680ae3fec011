use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth and password reset
/// - E2xxx: Profiles
/// - E3xxx: Swipes and matches
/// - E4xxx: Messaging
/// - E5xxx: Billing
/// - E6xxx: Moderation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    ServiceUnavailable,
    BadRequest,
    PayloadTooLarge,

    // Auth (E1xxx)
    InvalidCredentials,
    EmailAlreadyExists,
    TokenExpired,
    TokenInvalid,
    PasswordTooWeak,
    OtpExpired,
    OtpInvalid,
    ResetTokenExpired,
    ResetTokenInvalid,
    EmailRateLimited,

    // Profile (E2xxx)
    ProfileNotFound,
    InvalidDisplayName,
    UnderAge,
    PhotoUploadFailed,
    PhotoLimitReached,
    OnboardingIncomplete,
    ProfileSuspended,
    VerificationAlreadyPending,

    // Swipe / match (E3xxx)
    CannotSwipeSelf,
    InvalidSwipeDirection,
    MatchNotFound,
    NotMatchParticipant,
    QuotaExceeded,

    // Messaging (E4xxx)
    MessageEmpty,
    MessageTooLong,

    // Billing (E5xxx)
    PlanNotFound,
    TransactionNotFound,
    PaymentGatewayError,
    InvalidSignature,

    // Moderation (E6xxx)
    ReportNotFound,
    ReportAlreadyReviewed,
    CannotReportSelf,
    DuplicateReport,
    VerificationNotPending,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",
            Self::ServiceUnavailable => "E0007",
            Self::BadRequest => "E0008",
            Self::PayloadTooLarge => "E0009",

            // Auth
            Self::InvalidCredentials => "E1001",
            Self::EmailAlreadyExists => "E1002",
            Self::TokenExpired => "E1003",
            Self::TokenInvalid => "E1004",
            Self::PasswordTooWeak => "E1005",
            Self::OtpExpired => "E1006",
            Self::OtpInvalid => "E1007",
            Self::ResetTokenExpired => "E1008",
            Self::ResetTokenInvalid => "E1009",
            Self::EmailRateLimited => "E1010",

            // Profile
            Self::ProfileNotFound => "E2001",
            Self::InvalidDisplayName => "E2002",
            Self::UnderAge => "E2003",
            Self::PhotoUploadFailed => "E2004",
            Self::PhotoLimitReached => "E2005",
            Self::OnboardingIncomplete => "E2006",
            Self::ProfileSuspended => "E2007",
            Self::VerificationAlreadyPending => "E2008",

            // Swipe / match
            Self::CannotSwipeSelf => "E3001",
            Self::InvalidSwipeDirection => "E3002",
            Self::MatchNotFound => "E3003",
            Self::NotMatchParticipant => "E3004",
            Self::QuotaExceeded => "E3005",

            // Messaging
            Self::MessageEmpty => "E4001",
            Self::MessageTooLong => "E4002",

            // Billing
            Self::PlanNotFound => "E5001",
            Self::TransactionNotFound => "E5002",
            Self::PaymentGatewayError => "E5003",
            Self::InvalidSignature => "E5004",

            // Moderation
            Self::ReportNotFound => "E6001",
            Self::ReportAlreadyReviewed => "E6002",
            Self::CannotReportSelf => "E6003",
            Self::DuplicateReport => "E6004",
            Self::VerificationNotPending => "E6005",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentGatewayError => StatusCode::BAD_GATEWAY,
            Self::ValidationError | Self::BadRequest | Self::PasswordTooWeak
            | Self::InvalidDisplayName | Self::UnderAge | Self::PhotoUploadFailed
            | Self::CannotSwipeSelf | Self::InvalidSwipeDirection | Self::MessageEmpty
            | Self::MessageTooLong | Self::CannotReportSelf => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::ProfileNotFound | Self::MatchNotFound
            | Self::PlanNotFound | Self::TransactionNotFound | Self::ReportNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired
            | Self::TokenInvalid | Self::OtpExpired | Self::OtpInvalid
            | Self::ResetTokenExpired | Self::ResetTokenInvalid
            | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::OnboardingIncomplete | Self::ProfileSuspended
            | Self::NotMatchParticipant => StatusCode::FORBIDDEN,
            Self::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            Self::RateLimited | Self::EmailRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::EmailAlreadyExists | Self::PhotoLimitReached | Self::VerificationAlreadyPending
            | Self::ReportAlreadyReviewed | Self::DuplicateReport
            | Self::VerificationNotPending => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The error code for known errors, `None` for infrastructure failures.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Known { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn known_error_renders_code_and_status() {
        let response = AppError::new(ErrorCode::NotMatchParticipant, "nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let value = body_json(AppError::new(ErrorCode::NotMatchParticipant, "nope")).await;
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "E3004");
        assert_eq!(value["error"]["message"], "nope");
    }

    #[tokio::test]
    async fn quota_refusal_is_payment_required_with_details() {
        let err = AppError::with_details(
            ErrorCode::QuotaExceeded,
            "daily message limit reached",
            serde_json::json!({ "action": "message", "upgrade": true }),
        );
        assert_eq!(err.code(), Some(ErrorCode::QuotaExceeded));

        let value = body_json(err).await;
        assert_eq!(value["error"]["code"], "E3005");
        assert_eq!(value["error"]["details"]["upgrade"], true);
        assert_eq!(ErrorCode::QuotaExceeded.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        assert_eq!(ErrorCode::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
        let value = body_json(AppError::new(ErrorCode::InvalidSignature, "invalid signature")).await;
        assert_eq!(value["error"]["code"], "E5004");
    }

    #[tokio::test]
    async fn database_not_found_maps_to_404() {
        let response = AppError::Database(diesel::result::Error::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

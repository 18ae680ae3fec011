use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewAdminAction, NewReport, Report};
use crate::schema::{admin_actions, profiles, reports};

pub const REPORT_REASONS: [&str; 6] = [
    "fake_profile",
    "harassment",
    "inappropriate_content",
    "spam",
    "underage",
    "other",
];
pub const DETAILS_MAX: usize = 1000;
pub const SUSPENSION_REASON_MAX: usize = 500;

pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Actioned,
    Dismissed,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actioned => "actioned",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actioned" => Ok(Self::Actioned),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(AppError::new(
                ErrorCode::ValidationError,
                format!("invalid review status '{other}', expected actioned or dismissed"),
            )),
        }
    }
}

/// Audit log action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminActionKind {
    ReviewReport,
    SuspendUser,
    ReinstateUser,
    ApproveVerification,
    RejectVerification,
}

impl AdminActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReviewReport => "review_report",
            Self::SuspendUser => "suspend_user",
            Self::ReinstateUser => "reinstate_user",
            Self::ApproveVerification => "approve_verification",
            Self::RejectVerification => "reject_verification",
        }
    }
}

/// Normalized report input, ready to insert.
#[derive(Debug, PartialEq)]
pub struct ValidReport {
    pub reason: String,
    pub details: Option<String>,
}

pub fn validate_report(reporter_id: Uuid, reported_id: Uuid, reason: &str, details: Option<&str>) -> AppResult<ValidReport> {
    if reporter_id == reported_id {
        return Err(AppError::new(ErrorCode::CannotReportSelf, "you cannot report yourself"));
    }
    if !REPORT_REASONS.contains(&reason) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("reason must be one of: {}", REPORT_REASONS.join(", ")),
        ));
    }
    let details = details.map(str::trim).filter(|d| !d.is_empty());
    if details.is_some_and(|d| d.chars().count() > DETAILS_MAX) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("details must be at most {DETAILS_MAX} characters"),
        ));
    }
    Ok(ValidReport {
        reason: reason.to_string(),
        details: details.map(str::to_string),
    })
}

pub fn validate_suspension_reason(reason: &str) -> AppResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "a suspension reason is required"));
    }
    if reason.chars().count() > SUSPENSION_REASON_MAX {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("reason must be at most {SUSPENSION_REASON_MAX} characters"),
        ));
    }
    Ok(reason.to_string())
}

/// Status a pending verification moves to.
pub fn verification_status(approve: bool) -> &'static str {
    if approve { "verified" } else { "rejected" }
}

/// Suspension requested alongside a review. Only an actioned report may
/// suspend, and a suspension needs a reason.
pub fn review_suspension(decision: ReviewDecision, suspend: bool, reason: Option<&str>) -> AppResult<Option<String>> {
    if !suspend {
        return Ok(None);
    }
    if decision != ReviewDecision::Actioned {
        return Err(AppError::new(ErrorCode::ValidationError, "only an actioned report can suspend the user"));
    }
    validate_suspension_reason(reason.unwrap_or_default()).map(Some)
}

// --- Store ---

pub trait ModerationStore {
    fn profile_exists(&mut self, user_id: Uuid) -> AppResult<bool>;
    fn report_exists(&mut self, report_id: Uuid) -> AppResult<bool>;
    /// `None` when the pair already has a pending report.
    fn insert_report(&mut self, report: NewReport) -> AppResult<Option<Report>>;
    /// Close the report only if it is still pending.
    fn close_pending_report(
        &mut self,
        report_id: Uuid,
        status: &str,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Report>>;
    /// False when the profile does not exist.
    fn set_suspension(&mut self, user_id: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> AppResult<bool>;
    /// False unless the profile exists with a `pending` verification.
    fn resolve_pending_verification(
        &mut self,
        user_id: Uuid,
        status: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;
    fn insert_action(&mut self, action: NewAdminAction) -> AppResult<()>;
}

fn record_action<S: ModerationStore>(
    store: &mut S,
    admin_id: Uuid,
    kind: AdminActionKind,
    target_user_id: Uuid,
    details: serde_json::Value,
) -> AppResult<()> {
    store.insert_action(NewAdminAction {
        admin_id,
        action: kind.as_str().to_string(),
        target_user_id: Some(target_user_id),
        details: Some(details),
    })
}

// --- Operations ---

pub fn create_report<S: ModerationStore>(
    store: &mut S,
    reporter_id: Uuid,
    reported_id: Uuid,
    report: ValidReport,
) -> AppResult<Report> {
    if !store.profile_exists(reported_id)? {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "reported user not found"));
    }

    store
        .insert_report(NewReport {
            reporter_id,
            reported_id,
            reason: report.reason,
            details: report.details,
        })?
        .ok_or_else(|| {
            AppError::new(ErrorCode::DuplicateReport, "you already have a pending report for this user")
        })
}

/// Suspend and audit. The caller wraps this in a transaction.
pub fn suspend_user<S: ModerationStore>(
    store: &mut S,
    admin_id: Uuid,
    user_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if !store.set_suspension(user_id, Some(reason), now)? {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "profile not found"));
    }
    record_action(store, admin_id, AdminActionKind::SuspendUser, user_id, serde_json::json!({ "reason": reason }))
}

pub fn reinstate_user<S: ModerationStore>(
    store: &mut S,
    admin_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if !store.set_suspension(user_id, None, now)? {
        return Err(AppError::new(ErrorCode::ProfileNotFound, "profile not found"));
    }
    record_action(store, admin_id, AdminActionKind::ReinstateUser, user_id, serde_json::json!({}))
}

/// Close a pending report. The status guard makes a concurrent second
/// review fail with `ReportAlreadyReviewed`.
pub fn review_report<S: ModerationStore>(
    store: &mut S,
    admin_id: Uuid,
    report_id: Uuid,
    decision: ReviewDecision,
    suspension: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Report> {
    let Some(report) = store.close_pending_report(report_id, decision.as_str(), admin_id, now)? else {
        return Err(if store.report_exists(report_id)? {
            AppError::new(ErrorCode::ReportAlreadyReviewed, "report has already been reviewed")
        } else {
            AppError::new(ErrorCode::ReportNotFound, "report not found")
        });
    };

    record_action(
        store,
        admin_id,
        AdminActionKind::ReviewReport,
        report.reported_id,
        serde_json::json!({ "report_id": report.id, "status": decision.as_str() }),
    )?;

    if let Some(reason) = suspension {
        suspend_user(store, admin_id, report.reported_id, reason, now)?;
    }

    Ok(report)
}

/// Only a `pending` verification can be approved or rejected.
pub fn review_verification<S: ModerationStore>(
    store: &mut S,
    admin_id: Uuid,
    user_id: Uuid,
    approve: bool,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<&'static str> {
    let status = verification_status(approve);
    if !store.resolve_pending_verification(user_id, status, note, now)? {
        return Err(if store.profile_exists(user_id)? {
            AppError::new(ErrorCode::VerificationNotPending, "verification is not pending")
        } else {
            AppError::new(ErrorCode::ProfileNotFound, "profile not found")
        });
    }

    let kind = if approve {
        AdminActionKind::ApproveVerification
    } else {
        AdminActionKind::RejectVerification
    };
    record_action(store, admin_id, kind, user_id, serde_json::json!({ "note": note }))?;

    Ok(status)
}

// --- Postgres ---

pub struct PgModerationStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgModerationStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl ModerationStore for PgModerationStore<'_> {
    fn profile_exists(&mut self, user_id: Uuid) -> AppResult<bool> {
        let count: i64 = profiles::table.find(user_id).count().get_result(self.conn)?;
        Ok(count > 0)
    }

    fn report_exists(&mut self, report_id: Uuid) -> AppResult<bool> {
        let count: i64 = reports::table.find(report_id).count().get_result(self.conn)?;
        Ok(count > 0)
    }

    /// One pending report per pair is enforced by a partial unique index.
    fn insert_report(&mut self, report: NewReport) -> AppResult<Option<Report>> {
        match diesel::insert_into(reports::table).values(&report).get_result::<Report>(self.conn) {
            Ok(report) => Ok(Some(report)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close_pending_report(
        &mut self,
        report_id: Uuid,
        status: &str,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Report>> {
        Ok(diesel::update(
            reports::table
                .find(report_id)
                .filter(reports::status.eq(STATUS_PENDING)),
        )
        .set((
            reports::status.eq(status),
            reports::reviewed_by.eq(Some(admin_id)),
            reports::reviewed_at.eq(Some(now)),
        ))
        .get_result::<Report>(self.conn)
        .optional()?)
    }

    fn set_suspension(&mut self, user_id: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> AppResult<bool> {
        let updated = diesel::update(profiles::table.find(user_id))
            .set((
                profiles::is_suspended.eq(reason.is_some()),
                profiles::suspension_reason.eq(reason),
                profiles::updated_at.eq(now),
            ))
            .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn resolve_pending_verification(
        &mut self,
        user_id: Uuid,
        status: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let updated = diesel::update(
            profiles::table
                .find(user_id)
                .filter(profiles::verification_status.eq(STATUS_PENDING)),
        )
        .set((
            profiles::verification_status.eq(status),
            profiles::verification_note.eq(note),
            profiles::updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn insert_action(&mut self, action: NewAdminAction) -> AppResult<()> {
        diesel::insert_into(admin_actions::table).values(&action).execute(self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reporting_yourself_is_refused() {
        let id = Uuid::new_v4();
        let err = validate_report(id, id, "spam", None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CannotReportSelf));
    }

    #[test]
    fn report_reason_must_be_known() {
        let err = validate_report(Uuid::new_v4(), Uuid::new_v4(), "rude", None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
    }

    #[test]
    fn report_details_are_trimmed_and_bounded() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let report = validate_report(a, b, "harassment", Some("  sent threats  ")).unwrap();
        assert_eq!(report.details.as_deref(), Some("sent threats"));

        let blank = validate_report(a, b, "spam", Some("   ")).unwrap();
        assert_eq!(blank.details, None);

        let long = "x".repeat(DETAILS_MAX + 1);
        assert!(validate_report(a, b, "other", Some(&long)).is_err());
    }

    #[test]
    fn review_status_parses_only_final_states() {
        assert_eq!("actioned".parse::<ReviewDecision>().unwrap(), ReviewDecision::Actioned);
        assert_eq!("dismissed".parse::<ReviewDecision>().unwrap(), ReviewDecision::Dismissed);
        let err = "pending".parse::<ReviewDecision>().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
    }

    #[test]
    fn dismissed_report_cannot_suspend() {
        assert_eq!(review_suspension(ReviewDecision::Dismissed, false, None).unwrap(), None);
        assert!(review_suspension(ReviewDecision::Dismissed, true, Some("spam")).is_err());
    }

    #[test]
    fn actioned_suspension_needs_a_reason() {
        assert!(review_suspension(ReviewDecision::Actioned, true, None).is_err());
        assert!(review_suspension(ReviewDecision::Actioned, true, Some("   ")).is_err());
        assert_eq!(
            review_suspension(ReviewDecision::Actioned, true, Some(" repeated spam ")).unwrap(),
            Some("repeated spam".to_string())
        );
    }

    #[test]
    fn verification_decision_maps_to_status() {
        assert_eq!(verification_status(true), "verified");
        assert_eq!(verification_status(false), "rejected");
    }

    #[test]
    fn action_names_are_stable() {
        assert_eq!(AdminActionKind::SuspendUser.as_str(), "suspend_user");
        assert_eq!(AdminActionKind::RejectVerification.as_str(), "reject_verification");
    }

    // --- Store-backed operations ---

    #[derive(Default)]
    struct MemoryStore {
        /// user id -> (suspension reason, verification status)
        profiles: HashMap<Uuid, (Option<String>, String)>,
        reports: Vec<Report>,
        actions: Vec<NewAdminAction>,
    }

    impl MemoryStore {
        fn add_profile(&mut self, verification: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.profiles.insert(id, (None, verification.to_string()));
            id
        }

        fn actions(&self, kind: AdminActionKind) -> usize {
            self.actions.iter().filter(|a| a.action == kind.as_str()).count()
        }
    }

    impl ModerationStore for MemoryStore {
        fn profile_exists(&mut self, user_id: Uuid) -> AppResult<bool> {
            Ok(self.profiles.contains_key(&user_id))
        }

        fn report_exists(&mut self, report_id: Uuid) -> AppResult<bool> {
            Ok(self.reports.iter().any(|r| r.id == report_id))
        }

        fn insert_report(&mut self, report: NewReport) -> AppResult<Option<Report>> {
            let duplicate = self.reports.iter().any(|r| {
                r.reporter_id == report.reporter_id && r.reported_id == report.reported_id && r.status == STATUS_PENDING
            });
            if duplicate {
                return Ok(None);
            }
            let row = Report {
                id: Uuid::new_v4(),
                reporter_id: report.reporter_id,
                reported_id: report.reported_id,
                reason: report.reason,
                details: report.details,
                status: STATUS_PENDING.to_string(),
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now(),
            };
            self.reports.push(row.clone());
            Ok(Some(row))
        }

        fn close_pending_report(
            &mut self,
            report_id: Uuid,
            status: &str,
            admin_id: Uuid,
            now: DateTime<Utc>,
        ) -> AppResult<Option<Report>> {
            let Some(report) = self
                .reports
                .iter_mut()
                .find(|r| r.id == report_id && r.status == STATUS_PENDING)
            else {
                return Ok(None);
            };
            report.status = status.to_string();
            report.reviewed_by = Some(admin_id);
            report.reviewed_at = Some(now);
            Ok(Some(report.clone()))
        }

        fn set_suspension(&mut self, user_id: Uuid, reason: Option<&str>, _now: DateTime<Utc>) -> AppResult<bool> {
            match self.profiles.get_mut(&user_id) {
                Some(profile) => {
                    profile.0 = reason.map(str::to_string);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn resolve_pending_verification(
            &mut self,
            user_id: Uuid,
            status: &str,
            _note: Option<&str>,
            _now: DateTime<Utc>,
        ) -> AppResult<bool> {
            match self.profiles.get_mut(&user_id) {
                Some(profile) if profile.1 == STATUS_PENDING => {
                    profile.1 = status.to_string();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        fn insert_action(&mut self, action: NewAdminAction) -> AppResult<()> {
            self.actions.push(action);
            Ok(())
        }
    }

    fn spam() -> ValidReport {
        ValidReport { reason: "spam".into(), details: None }
    }

    #[test]
    fn reporting_an_unknown_user_is_not_found() {
        let mut store = MemoryStore::default();
        let err = create_report(&mut store, Uuid::new_v4(), Uuid::new_v4(), spam()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));
    }

    #[test]
    fn one_pending_report_per_pair() {
        let mut store = MemoryStore::default();
        let reporter = store.add_profile("unverified");
        let reported = store.add_profile("unverified");

        let first = create_report(&mut store, reporter, reported, spam()).unwrap();
        let err = create_report(&mut store, reporter, reported, spam()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DuplicateReport));
        assert_eq!(store.reports.len(), 1);

        // Someone else may still report the same user.
        let other = store.add_profile("unverified");
        assert!(create_report(&mut store, other, reported, spam()).is_ok());

        // Once reviewed, the pair may report again.
        review_report(&mut store, Uuid::new_v4(), first.id, ReviewDecision::Dismissed, None, Utc::now()).unwrap();
        assert!(create_report(&mut store, reporter, reported, spam()).is_ok());
    }

    #[test]
    fn a_report_is_reviewed_once() {
        let mut store = MemoryStore::default();
        let (reporter, reported) = (store.add_profile("unverified"), store.add_profile("unverified"));
        let report = create_report(&mut store, reporter, reported, spam()).unwrap();
        let admin = Uuid::new_v4();

        let reviewed = review_report(&mut store, admin, report.id, ReviewDecision::Actioned, None, Utc::now()).unwrap();
        assert_eq!(reviewed.status, "actioned");
        assert_eq!(reviewed.reviewed_by, Some(admin));

        let err = review_report(&mut store, admin, report.id, ReviewDecision::Dismissed, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ReportAlreadyReviewed));
        assert_eq!(store.reports[0].status, "actioned");

        let err = review_report(&mut store, admin, Uuid::new_v4(), ReviewDecision::Actioned, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ReportNotFound));

        assert_eq!(store.actions(AdminActionKind::ReviewReport), 1);
    }

    #[test]
    fn actioned_review_can_suspend_the_reported_user() {
        let mut store = MemoryStore::default();
        let (reporter, reported) = (store.add_profile("unverified"), store.add_profile("unverified"));
        let report = create_report(&mut store, reporter, reported, spam()).unwrap();

        review_report(&mut store, Uuid::new_v4(), report.id, ReviewDecision::Actioned, Some("spam ring"), Utc::now())
            .unwrap();

        assert_eq!(store.profiles[&reported].0.as_deref(), Some("spam ring"));
        assert_eq!(store.actions(AdminActionKind::ReviewReport), 1);
        assert_eq!(store.actions(AdminActionKind::SuspendUser), 1);
    }

    #[test]
    fn suspension_and_reinstatement_are_audited() {
        let mut store = MemoryStore::default();
        let user = store.add_profile("unverified");
        let admin = Uuid::new_v4();

        suspend_user(&mut store, admin, user, "harassment", Utc::now()).unwrap();
        assert_eq!(store.profiles[&user].0.as_deref(), Some("harassment"));

        reinstate_user(&mut store, admin, user, Utc::now()).unwrap();
        assert_eq!(store.profiles[&user].0, None);

        assert_eq!(store.actions.len(), 2);
        assert!(store.actions.iter().all(|a| a.admin_id == admin && a.target_user_id == Some(user)));
    }

    #[test]
    fn unknown_user_cannot_be_suspended_and_leaves_no_audit() {
        let mut store = MemoryStore::default();
        let err = suspend_user(&mut store, Uuid::new_v4(), Uuid::new_v4(), "spam", Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));
        let err = reinstate_user(&mut store, Uuid::new_v4(), Uuid::new_v4(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));
        assert!(store.actions.is_empty());
    }

    #[test]
    fn verification_is_reviewed_only_from_pending() {
        let mut store = MemoryStore::default();
        let pending = store.add_profile("pending");
        let unverified = store.add_profile("unverified");
        let admin = Uuid::new_v4();

        let status = review_verification(&mut store, admin, pending, true, None, Utc::now()).unwrap();
        assert_eq!(status, "verified");
        assert_eq!(store.profiles[&pending].1, "verified");

        let err = review_verification(&mut store, admin, pending, false, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::VerificationNotPending));
        assert_eq!(store.profiles[&pending].1, "verified");

        let err = review_verification(&mut store, admin, unverified, true, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::VerificationNotPending));

        let err = review_verification(&mut store, admin, Uuid::new_v4(), true, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProfileNotFound));

        assert_eq!(store.actions(AdminActionKind::ApproveVerification), 1);
        assert_eq!(store.actions(AdminActionKind::RejectVerification), 0);
    }
}

//! Checkout and activation.
//!
//! A subscription is only ever upgraded from a transaction row this service
//! created: the tier and price come from that row, the gateway only confirms
//! that the money arrived. Verification runs under `SELECT ... FOR UPDATE` on
//! the transaction so the redirect-driven verify and the webhook can race
//! without activating twice.

use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use amora_shared::entitlement::{self, Entitlement, QuotaPolicy, Tier};
use amora_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewTransaction, Transaction};
use crate::schema::transactions;
use crate::services::paystack::{CheckoutRequest, CheckoutSession, GatewayTransaction, PaymentGateway};
use crate::services::plans::{self, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Abandoned,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Abandoned => "abandoned",
        }
    }

    /// Anything the gateway reports that is not final keeps the row pending.
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "success" => TransactionStatus::Success,
            "failed" | "reversed" => TransactionStatus::Failed,
            "abandoned" => TransactionStatus::Abandoned,
            _ => TransactionStatus::Pending,
        }
    }
}

pub fn generate_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("amr_{suffix}")
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub reference: String,
    pub verified: bool,
    pub status: TransactionStatus,
    pub tier: Option<Tier>,
    pub period_end: Option<DateTime<Utc>>,
    /// True only for the call that moved the transaction to success.
    #[serde(skip)]
    pub newly_activated: bool,
    #[serde(skip)]
    pub user_id: Uuid,
}

pub trait BillingStore {
    fn insert_pending(&mut self, tx: NewTransaction) -> AppResult<Transaction>;
    fn lock_by_reference(&mut self, reference: &str) -> AppResult<Option<Transaction>>;
    fn update_status(
        &mut self,
        reference: &str,
        status: TransactionStatus,
        gateway_status: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> AppResult<()>;
    fn activate_tier(
        &mut self,
        user_id: Uuid,
        tier: Tier,
        period_end: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> AppResult<Entitlement>;
}

/// Store the pending row, then ask the gateway for a hosted checkout page.
/// A gateway failure marks the row failed.
pub async fn initialize_checkout<G, S>(
    gateway: &G,
    store: &mut S,
    user_id: Uuid,
    plan: &Plan,
    email: &str,
    callback_url: &str,
) -> AppResult<CheckoutSession>
where
    G: PaymentGateway + ?Sized,
    S: BillingStore + Send,
{
    let reference = generate_reference();
    store.insert_pending(NewTransaction {
        reference: reference.clone(),
        user_id,
        plan_id: plan.id.to_string(),
        tier: plan.tier.as_str().to_string(),
        amount: plan.amount,
        currency: plan.currency.to_string(),
        status: TransactionStatus::Pending.as_str().to_string(),
    })?;

    let request = CheckoutRequest {
        email: email.to_string(),
        amount: plan.amount,
        currency: plan.currency.to_string(),
        reference: reference.clone(),
        callback_url: callback_url.to_string(),
        metadata: serde_json::json!({ "user_id": user_id, "plan_id": plan.id }),
    };

    match gateway.initialize(&request).await {
        Ok(session) => Ok(session),
        Err(e) => {
            tracing::error!(error = %e, reference = %reference, "checkout initialization failed");
            store.update_status(&reference, TransactionStatus::Failed, "initialize_failed", None)?;
            Err(AppError::new(ErrorCode::PaymentGatewayError, "payment provider unavailable, try again later"))
        }
    }
}

/// Apply what the gateway reports for a reference. Only an exact `success`
/// with the stored amount and currency upgrades the subscription; replays of
/// an applied success change nothing.
pub fn apply_verification<S: BillingStore>(
    store: &mut S,
    reported: &GatewayTransaction,
    now: DateTime<Utc>,
    policy: &QuotaPolicy,
) -> AppResult<VerificationOutcome> {
    let tx = store
        .lock_by_reference(&reported.reference)?
        .ok_or_else(|| AppError::new(ErrorCode::TransactionNotFound, "transaction not found"))?;
    let tier = plans::find_plan(&tx.plan_id).map(|p| p.tier).unwrap_or_else(|_| Tier::from_stored(&tx.tier));
    let period_days = plans::find_plan(&tx.plan_id).map(|p| p.period_days).unwrap_or(30);

    let outcome = |status: TransactionStatus, period_end: Option<DateTime<Utc>>, newly_activated: bool| VerificationOutcome {
        reference: tx.reference.clone(),
        verified: status == TransactionStatus::Success,
        status,
        tier: (status == TransactionStatus::Success).then_some(tier),
        period_end,
        newly_activated,
        user_id: tx.user_id,
    };

    if tx.status == TransactionStatus::Success.as_str() {
        return Ok(outcome(TransactionStatus::Success, None, false));
    }

    if reported.status != "success" {
        let status = TransactionStatus::from_gateway(&reported.status);
        store.update_status(&tx.reference, status, &reported.status, None)?;
        tracing::info!(reference = %tx.reference, gateway_status = %reported.status, "payment not successful");
        return Ok(outcome(status, None, false));
    }

    if reported.amount != tx.amount || !reported.currency.eq_ignore_ascii_case(&tx.currency) {
        tracing::warn!(
            reference = %tx.reference,
            expected_amount = tx.amount,
            reported_amount = reported.amount,
            expected_currency = %tx.currency,
            reported_currency = %reported.currency,
            "payment amount mismatch, not activating"
        );
        store.update_status(&tx.reference, TransactionStatus::Failed, "amount_mismatch", None)?;
        return Ok(outcome(TransactionStatus::Failed, None, false));
    }

    store.update_status(
        &tx.reference,
        TransactionStatus::Success,
        &reported.status,
        Some(reported.paid_at.unwrap_or(now)),
    )?;
    let activated = store.activate_tier(tx.user_id, tier, now + Duration::days(period_days), policy)?;

    tracing::info!(
        user_id = %tx.user_id,
        reference = %tx.reference,
        tier = %tier,
        "subscription activated"
    );

    Ok(outcome(TransactionStatus::Success, activated.current_period_end, true))
}

// --- Postgres ---

pub struct PgBillingStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgBillingStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl BillingStore for PgBillingStore<'_> {
    fn insert_pending(&mut self, tx: NewTransaction) -> AppResult<Transaction> {
        Ok(diesel::insert_into(transactions::table)
            .values(&tx)
            .get_result::<Transaction>(self.conn)?)
    }

    fn lock_by_reference(&mut self, reference: &str) -> AppResult<Option<Transaction>> {
        Ok(transactions::table
            .filter(transactions::reference.eq(reference))
            .for_update()
            .first::<Transaction>(self.conn)
            .optional()?)
    }

    fn update_status(
        &mut self,
        reference: &str,
        status: TransactionStatus,
        gateway_status: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        diesel::update(transactions::table.filter(transactions::reference.eq(reference)))
            .set((
                transactions::status.eq(status.as_str()),
                transactions::gateway_status.eq(gateway_status),
                transactions::paid_at.eq(paid_at),
                transactions::updated_at.eq(Utc::now()),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn activate_tier(
        &mut self,
        user_id: Uuid,
        tier: Tier,
        period_end: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> AppResult<Entitlement> {
        Ok(entitlement::db::activate_tier(self.conn, user_id, tier, period_end, policy)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::paystack::GatewayError;
    use amora_shared::entitlement::Remaining;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        transactions: HashMap<String, Transaction>,
        entitlements: HashMap<Uuid, Entitlement>,
    }

    impl BillingStore for MemoryStore {
        fn insert_pending(&mut self, tx: NewTransaction) -> AppResult<Transaction> {
            let now = Utc::now();
            let row = Transaction {
                id: Uuid::new_v4(),
                reference: tx.reference,
                user_id: tx.user_id,
                plan_id: tx.plan_id,
                tier: tx.tier,
                amount: tx.amount,
                currency: tx.currency,
                status: tx.status,
                gateway_status: None,
                paid_at: None,
                created_at: now,
                updated_at: now,
            };
            self.transactions.insert(row.reference.clone(), row.clone());
            Ok(row)
        }

        fn lock_by_reference(&mut self, reference: &str) -> AppResult<Option<Transaction>> {
            Ok(self.transactions.get(reference).cloned())
        }

        fn update_status(
            &mut self,
            reference: &str,
            status: TransactionStatus,
            gateway_status: &str,
            paid_at: Option<DateTime<Utc>>,
        ) -> AppResult<()> {
            if let Some(tx) = self.transactions.get_mut(reference) {
                tx.status = status.as_str().to_string();
                tx.gateway_status = Some(gateway_status.to_string());
                tx.paid_at = paid_at;
            }
            Ok(())
        }

        fn activate_tier(
            &mut self,
            user_id: Uuid,
            tier: Tier,
            period_end: DateTime<Utc>,
            policy: &QuotaPolicy,
        ) -> AppResult<Entitlement> {
            let current = self
                .entitlements
                .remove(&user_id)
                .unwrap_or_else(|| Entitlement::free(user_id, Utc::now(), policy));
            let activated = current.activate(tier, period_end);
            self.entitlements.insert(user_id, activated.clone());
            Ok(activated)
        }
    }

    /// Scripted gateway: records requests, answers initialize with a fixed URL
    /// or an error.
    struct MockGateway {
        fail: bool,
        requests: Mutex<Vec<CheckoutRequest>>,
    }

    impl MockGateway {
        fn new(fail: bool) -> Self {
            Self { fail, requests: Mutex::new(Vec::new()) }
        }
    }

    #[axum::async_trait]
    impl PaymentGateway for MockGateway {
        async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GatewayError::Rejected("service down".into()));
            }
            Ok(CheckoutSession {
                authorization_url: format!("https://checkout.test/{}", request.reference),
                access_code: "code".into(),
                reference: request.reference.clone(),
            })
        }

        async fn verify(&self, reference: &str) -> Result<GatewayTransaction, GatewayError> {
            Err(GatewayError::Rejected(format!("not scripted: {reference}")))
        }
    }

    fn policy() -> QuotaPolicy {
        QuotaPolicy::default()
    }

    fn report(reference: &str, status: &str, amount: i64) -> GatewayTransaction {
        GatewayTransaction {
            reference: reference.to_string(),
            status: status.to_string(),
            amount,
            currency: "NGN".into(),
            paid_at: None,
        }
    }

    async fn checkout(store: &mut MemoryStore, user_id: Uuid, plan_id: &str) -> String {
        let gateway = MockGateway::new(false);
        let plan = plans::find_plan(plan_id).unwrap();
        let session = initialize_checkout(&gateway, store, user_id, plan, "ada@example.com", "https://app.test/cb")
            .await
            .unwrap();
        session.reference
    }

    #[tokio::test]
    async fn checkout_uses_server_side_price() {
        let mut store = MemoryStore::default();
        let gateway = MockGateway::new(false);
        let plan = plans::find_plan("premium_monthly").unwrap();
        let user_id = Uuid::new_v4();

        let session = initialize_checkout(&gateway, &mut store, user_id, plan, "ada@example.com", "https://app.test/cb")
            .await
            .unwrap();

        let sent = gateway.requests.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, 300_000);
        assert_eq!(sent[0].currency, "NGN");
        assert_eq!(sent[0].reference, session.reference);

        let row = &store.transactions[&session.reference];
        assert_eq!(row.status, "pending");
        assert_eq!(row.user_id, user_id);
        assert!(session.authorization_url.ends_with(&session.reference));
    }

    #[tokio::test]
    async fn gateway_failure_marks_transaction_failed() {
        let mut store = MemoryStore::default();
        let gateway = MockGateway::new(true);
        let plan = plans::find_plan("premium_monthly").unwrap();

        let err = initialize_checkout(&gateway, &mut store, Uuid::new_v4(), plan, "ada@example.com", "cb")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PaymentGatewayError));
        let row = store.transactions.values().next().unwrap();
        assert_eq!(row.status, "failed");
    }

    #[tokio::test]
    async fn only_exact_success_activates() {
        for status in ["failed", "abandoned", "ongoing", "Success", "successful"] {
            let mut store = MemoryStore::default();
            let user_id = Uuid::new_v4();
            let reference = checkout(&mut store, user_id, "premium_monthly").await;

            let outcome = apply_verification(&mut store, &report(&reference, status, 300_000), Utc::now(), &policy()).unwrap();
            assert!(!outcome.verified, "{status}");
            assert!(outcome.tier.is_none());
            assert!(store.entitlements.is_empty(), "{status}");
        }
    }

    #[tokio::test]
    async fn success_activates_once() {
        let mut store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let reference = checkout(&mut store, user_id, "premium_plus_monthly").await;
        let now = Utc::now();

        let first = apply_verification(&mut store, &report(&reference, "success", 500_000), now, &policy()).unwrap();
        assert!(first.verified);
        assert!(first.newly_activated);
        assert_eq!(first.tier, Some(Tier::PremiumPlus));

        let entitlement = store.entitlements[&user_id].clone();
        assert_eq!(entitlement.tier, Tier::PremiumPlus);
        assert_eq!(entitlement.swipes_remaining, Remaining::Unlimited);
        assert_eq!(entitlement.messages_remaining, Remaining::Unlimited);
        assert_eq!(entitlement.current_period_end, Some(now + Duration::days(30)));

        let replay = apply_verification(&mut store, &report(&reference, "success", 500_000), now, &policy()).unwrap();
        assert!(replay.verified);
        assert!(!replay.newly_activated);
        assert_eq!(store.entitlements[&user_id], entitlement);
    }

    #[tokio::test]
    async fn amount_mismatch_fails_transaction() {
        let mut store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let reference = checkout(&mut store, user_id, "premium_plus_monthly").await;

        let outcome = apply_verification(&mut store, &report(&reference, "success", 100), Utc::now(), &policy()).unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.status, TransactionStatus::Failed);
        assert_eq!(store.transactions[&reference].status, "failed");
        assert!(store.entitlements.is_empty());
    }

    #[test]
    fn unknown_reference_is_not_found() {
        let mut store = MemoryStore::default();
        let err = apply_verification(&mut store, &report("amr_missing", "success", 1), Utc::now(), &policy()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TransactionNotFound));
    }

    #[test]
    fn references_are_unique_and_prefixed() {
        let a = generate_reference();
        let b = generate_reference();
        assert!(a.starts_with("amr_"));
        assert_eq!(a.len(), 28);
        assert_ne!(a, b);
    }
}

//! Subscription tiers and the daily swipe/message quota.
//!
//! The pure part (`Entitlement` and friends) decides whether an action is
//! allowed and what the counters look like afterwards. The `db` functions apply
//! it to the `subscriptions` row under `SELECT ... FOR UPDATE`, so callers that
//! also write a swipe or a message must run both in the same transaction.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, ErrorCode};
use crate::schema::subscriptions;

/// Storage value for an unlimited counter.
pub const UNLIMITED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    PremiumPlus,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::PremiumPlus => "premium_plus",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Lenient parse for stored rows; anything unknown is treated as free.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(tier = %value, "unknown subscription tier, treating as free");
            Tier::Free
        })
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "premium_plus" => Ok(Tier::PremiumPlus),
            _ => Err(format!("unknown tier: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAction {
    Swipe,
    Message,
}

impl QuotaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaAction::Swipe => "swipe",
            QuotaAction::Message => "message",
        }
    }
}

/// A counter value. Serialized with the storage sentinel: `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Remaining {
    Unlimited,
    Limited(u32),
}

impl Remaining {
    pub fn is_available(&self) -> bool {
        match self {
            Remaining::Unlimited => true,
            Remaining::Limited(n) => *n > 0,
        }
    }

    fn decremented(self) -> Self {
        match self {
            Remaining::Unlimited => Remaining::Unlimited,
            Remaining::Limited(n) => Remaining::Limited(n.saturating_sub(1)),
        }
    }
}

impl From<i32> for Remaining {
    fn from(stored: i32) -> Self {
        if stored < 0 {
            Remaining::Unlimited
        } else {
            Remaining::Limited(stored as u32)
        }
    }
}

impl From<Remaining> for i32 {
    fn from(remaining: Remaining) -> Self {
        match remaining {
            Remaining::Unlimited => UNLIMITED,
            Remaining::Limited(n) => i32::try_from(n).unwrap_or(i32::MAX),
        }
    }
}

/// Free-tier allowances. Paid tiers ignore the counts entirely.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuotaPolicy {
    #[serde(default = "default_free_daily_swipes")]
    pub free_daily_swipes: u32,
    #[serde(default = "default_free_daily_messages")]
    pub free_daily_messages: u32,
    #[serde(default = "default_reset_window_hours")]
    pub reset_window_hours: i64,
}

fn default_free_daily_swipes() -> u32 { 50 }
fn default_free_daily_messages() -> u32 { 20 }
fn default_reset_window_hours() -> i64 { 24 }

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free_daily_swipes: default_free_daily_swipes(),
            free_daily_messages: default_free_daily_messages(),
            reset_window_hours: default_reset_window_hours(),
        }
    }
}

impl QuotaPolicy {
    pub fn window(&self) -> Duration {
        Duration::hours(self.reset_window_hours)
    }

    fn free_allowance(&self, action: QuotaAction) -> Remaining {
        match action {
            QuotaAction::Swipe => Remaining::Limited(self.free_daily_swipes),
            QuotaAction::Message => Remaining::Limited(self.free_daily_messages),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub tier: Tier,
    pub swipes_remaining: Remaining,
    pub messages_remaining: Remaining,
    pub last_swipe_reset: DateTime<Utc>,
    pub last_message_reset: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn free(user_id: Uuid, now: DateTime<Utc>, policy: &QuotaPolicy) -> Self {
        Self {
            user_id,
            tier: Tier::Free,
            swipes_remaining: policy.free_allowance(QuotaAction::Swipe),
            messages_remaining: policy.free_allowance(QuotaAction::Message),
            last_swipe_reset: now,
            last_message_reset: now,
            current_period_end: None,
        }
    }

    pub fn remaining(&self, action: QuotaAction) -> Remaining {
        match action {
            QuotaAction::Swipe => self.swipes_remaining,
            QuotaAction::Message => self.messages_remaining,
        }
    }

    pub fn can_perform(&self, action: QuotaAction) -> bool {
        self.remaining(action).is_available()
    }

    /// Spend one unit. Never goes below zero; unlimited stays unlimited.
    pub fn consume(mut self, action: QuotaAction) -> Self {
        match action {
            QuotaAction::Swipe => self.swipes_remaining = self.swipes_remaining.decremented(),
            QuotaAction::Message => self.messages_remaining = self.messages_remaining.decremented(),
        }
        self
    }

    /// Check and consume in one step, refusing with `QuotaExceeded` when empty.
    pub fn charge(&mut self, action: QuotaAction, policy: &QuotaPolicy) -> Result<Remaining, AppError> {
        if !self.can_perform(action) {
            metrics::counter!("quota_refusals_total", "action" => action.as_str()).increment(1);
            let resets_at = match action {
                QuotaAction::Swipe => self.last_swipe_reset,
                QuotaAction::Message => self.last_message_reset,
            } + policy.window();
            return Err(AppError::with_details(
                ErrorCode::QuotaExceeded,
                format!("daily {} limit reached", action.as_str()),
                serde_json::json!({
                    "action": action,
                    "tier": self.tier,
                    "resets_at": resets_at,
                    "upgrade": true,
                }),
            ));
        }
        *self = self.clone().consume(action);
        Ok(self.remaining(action))
    }

    /// Apply expiry and the rolling reset window as of `now`.
    ///
    /// A paid tier past its period end falls back to free with fresh counters.
    /// Free counters refill once `reset_window_hours` have passed since their
    /// last reset; each counter has its own window.
    pub fn refreshed(mut self, now: DateTime<Utc>, policy: &QuotaPolicy) -> Self {
        if self.tier.is_paid() {
            match self.current_period_end {
                Some(end) if now >= end => {
                    return Self::free(self.user_id, now, policy);
                }
                _ => {
                    self.swipes_remaining = Remaining::Unlimited;
                    self.messages_remaining = Remaining::Unlimited;
                    return self;
                }
            }
        }

        if now - self.last_swipe_reset >= policy.window() {
            self.swipes_remaining = policy.free_allowance(QuotaAction::Swipe);
            self.last_swipe_reset = now;
        }
        if now - self.last_message_reset >= policy.window() {
            self.messages_remaining = policy.free_allowance(QuotaAction::Message);
            self.last_message_reset = now;
        }
        self
    }

    /// Move to a paid tier until `period_end`. Never shortens an existing period.
    pub fn activate(mut self, tier: Tier, period_end: DateTime<Utc>) -> Self {
        self.tier = tier;
        self.swipes_remaining = Remaining::Unlimited;
        self.messages_remaining = Remaining::Unlimited;
        self.current_period_end = Some(match self.current_period_end {
            Some(existing) if existing > period_end => existing,
            _ => period_end,
        });
        self
    }
}

// --- Persistence ---

#[derive(Debug, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionRow {
    pub user_id: Uuid,
    pub tier: String,
    pub swipes_remaining: i32,
    pub messages_remaining: i32,
    pub last_swipe_reset: DateTime<Utc>,
    pub last_message_reset: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = subscriptions)]
#[diesel(treat_none_as_null = true)]
struct SubscriptionValues<'a> {
    user_id: Uuid,
    tier: &'a str,
    swipes_remaining: i32,
    messages_remaining: i32,
    last_swipe_reset: DateTime<Utc>,
    last_message_reset: DateTime<Utc>,
    current_period_end: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Entitlement> for SubscriptionValues<'a> {
    fn from(e: &'a Entitlement) -> Self {
        Self {
            user_id: e.user_id,
            tier: e.tier.as_str(),
            swipes_remaining: e.swipes_remaining.into(),
            messages_remaining: e.messages_remaining.into(),
            last_swipe_reset: e.last_swipe_reset,
            last_message_reset: e.last_message_reset,
            current_period_end: e.current_period_end,
        }
    }
}

impl From<SubscriptionRow> for Entitlement {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            user_id: row.user_id,
            tier: Tier::from_stored(&row.tier),
            swipes_remaining: row.swipes_remaining.into(),
            messages_remaining: row.messages_remaining.into(),
            last_swipe_reset: row.last_swipe_reset,
            last_message_reset: row.last_message_reset,
            current_period_end: row.current_period_end,
        }
    }
}

pub mod db {
    use super::*;
    use diesel::pg::PgConnection;

    /// Lock the caller's subscription row for the rest of the transaction,
    /// creating a free row first if the user has none. The returned value is
    /// already refreshed; persist it with [`save`] after consuming.
    pub fn lock_for_update(
        conn: &mut PgConnection,
        user_id: Uuid,
        now: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> QueryResult<Entitlement> {
        let fresh = Entitlement::free(user_id, now, policy);
        diesel::insert_into(subscriptions::table)
            .values(SubscriptionValues::from(&fresh))
            .on_conflict(subscriptions::user_id)
            .do_nothing()
            .execute(conn)?;

        let row = subscriptions::table
            .find(user_id)
            .for_update()
            .first::<SubscriptionRow>(conn)?;

        Ok(Entitlement::from(row).refreshed(now, policy))
    }

    pub fn save(conn: &mut PgConnection, entitlement: &Entitlement) -> QueryResult<()> {
        diesel::update(subscriptions::table.find(entitlement.user_id))
            .set((
                SubscriptionValues::from(entitlement),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Read-only view for display. Nothing is written, so a pending reset shows
    /// up here before the next locked write persists it.
    pub fn load(
        conn: &mut PgConnection,
        user_id: Uuid,
        now: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> QueryResult<Entitlement> {
        let row = subscriptions::table
            .find(user_id)
            .first::<SubscriptionRow>(conn)
            .optional()?;

        Ok(match row {
            Some(row) => Entitlement::from(row).refreshed(now, policy),
            None => Entitlement::free(user_id, now, policy),
        })
    }

    pub fn activate_tier(
        conn: &mut PgConnection,
        user_id: Uuid,
        tier: Tier,
        period_end: DateTime<Utc>,
        policy: &QuotaPolicy,
    ) -> QueryResult<Entitlement> {
        let current = lock_for_update(conn, user_id, Utc::now(), policy)?;
        let activated = current.activate(tier, period_end);
        save(conn, &activated)?;
        Ok(activated)
    }
}

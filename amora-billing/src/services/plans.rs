use serde::Serialize;

use amora_shared::entitlement::Tier;
use amora_shared::errors::{AppError, AppResult, ErrorCode};

/// A purchasable plan. Amounts are in the currency's minor unit (kobo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub tier: Tier,
    pub amount: i64,
    pub currency: &'static str,
    pub period_days: i64,
}

pub const PLANS: [Plan; 2] = [
    Plan {
        id: "premium_monthly",
        name: "Premium",
        tier: Tier::Premium,
        amount: 300_000,
        currency: "NGN",
        period_days: 30,
    },
    Plan {
        id: "premium_plus_monthly",
        name: "Premium Plus",
        tier: Tier::PremiumPlus,
        amount: 500_000,
        currency: "NGN",
        period_days: 30,
    },
];

pub fn find_plan(plan_id: &str) -> AppResult<&'static Plan> {
    PLANS
        .iter()
        .find(|p| p.id == plan_id)
        .ok_or_else(|| AppError::new(ErrorCode::PlanNotFound, format!("unknown plan: {plan_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_are_paid_and_unique() {
        for plan in &PLANS {
            assert!(plan.tier.is_paid());
            assert!(plan.amount > 0);
            assert_eq!(PLANS.iter().filter(|p| p.id == plan.id).count(), 1);
        }
    }

    #[test]
    fn lookup_by_id() {
        assert_eq!(find_plan("premium_plus_monthly").unwrap().tier, Tier::PremiumPlus);
        let err = find_plan("gold_yearly").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::PlanNotFound));
    }
}

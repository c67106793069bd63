//! Pricing plans and the subscription calculator
//!
//! All prices are per user per month in RUB. Discounts are whole
//! percents so quotes are exact.

use serde::Serialize;

/// Maximum combined discount (prepay + volume), percent
pub const MAX_COMBINED_DISCOUNT: u32 = 28;

/// Trial period in days
pub const TRIAL_DAYS: u32 = 30;

/// Maximum users during the trial
pub const TRIAL_MAX_USERS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Start,
    Business,
    Corp,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: &'static str,
    /// RUB per user per month
    pub price: u32,
    pub min_users: u32,
    pub bases_included: u32,
    /// RUB per month for each database above the included ones
    pub extra_base: u32,
    /// Included disk, GB
    pub disk_gb: u32,
    /// RUB per GB above the included disk
    pub disk_overage: u32,
    pub support: &'static str,
    pub reaction: &'static str,
}

pub const PLANS: [Plan; 3] = [
    Plan {
        id: PlanId::Start,
        name: "Старт",
        price: 890,
        min_users: 1,
        bases_included: 1,
        extra_base: 500,
        disk_gb: 10,
        disk_overage: 5,
        support: "Email, чат",
        reaction: "<4ч",
    },
    Plan {
        id: PlanId::Business,
        name: "Бизнес",
        price: 790,
        min_users: 5,
        bases_included: 3,
        extra_base: 400,
        disk_gb: 20,
        disk_overage: 4,
        support: "Email, чат, тел",
        reaction: "<2ч",
    },
    Plan {
        id: PlanId::Corp,
        name: "Корпорация",
        price: 690,
        min_users: 15,
        bases_included: 10,
        extra_base: 300,
        disk_gb: 50,
        disk_overage: 3,
        support: "Перс. менеджер",
        reaction: "<1ч",
    },
];

/// Prepayment period and its discount
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PrepayDiscount {
    pub months: u32,
    pub percent: u32,
}

pub const PREPAY_DISCOUNTS: [PrepayDiscount; 4] = [
    PrepayDiscount { months: 1, percent: 0 },
    PrepayDiscount { months: 3, percent: 5 },
    PrepayDiscount { months: 6, percent: 10 },
    PrepayDiscount { months: 12, percent: 15 },
];

/// `(min users, percent)` tiers, ascending
pub const VOLUME_DISCOUNTS: [(u32, u32); 4] = [(1, 0), (5, 5), (10, 10), (20, 15)];

/// Calculator result
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub plan: PlanId,
    pub users: u32,
    pub months: u32,
    /// Combined discount applied, percent
    pub discount_percent: u32,
    pub price_per_user: u64,
    pub total_monthly: u64,
    pub total_payment: u64,
}

pub fn volume_discount(users: u32) -> u32 {
    VOLUME_DISCOUNTS
        .iter()
        .filter(|(min, _)| users >= *min)
        .map(|(_, percent)| *percent)
        .last()
        .unwrap_or(0)
}

/// Unknown periods get no prepay discount
pub fn prepay_discount(months: u32) -> u32 {
    PREPAY_DISCOUNTS
        .iter()
        .find(|p| p.months == months)
        .map(|p| p.percent)
        .unwrap_or(0)
}

/// Largest plan whose minimum the user count meets
pub fn auto_select_plan(users: u32) -> &'static Plan {
    PLANS
        .iter()
        .rev()
        .find(|plan| users >= plan.min_users)
        .unwrap_or(&PLANS[0])
}

pub fn quote(users: u32, months: u32) -> Quote {
    let users = users.max(1);
    let plan = auto_select_plan(users);
    let discount_percent =
        (prepay_discount(months) + volume_discount(users)).min(MAX_COMBINED_DISCOUNT);

    // Half-up rounding to whole rubles
    let discounted = u64::from(plan.price) * u64::from(100 - discount_percent);
    let price_per_user = (discounted + 50) / 100;
    let total_monthly = price_per_user.saturating_mul(u64::from(users));

    Quote {
        plan: plan.id,
        users,
        months,
        discount_percent,
        price_per_user,
        total_monthly,
        total_payment: total_monthly.saturating_mul(u64::from(months.max(1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_select_plan() {
        assert_eq!(auto_select_plan(1).id, PlanId::Start);
        assert_eq!(auto_select_plan(4).id, PlanId::Start);
        assert_eq!(auto_select_plan(5).id, PlanId::Business);
        assert_eq!(auto_select_plan(15).id, PlanId::Corp);
        assert_eq!(auto_select_plan(0).id, PlanId::Start);
    }

    #[test]
    fn test_volume_discount_tiers() {
        assert_eq!(volume_discount(1), 0);
        assert_eq!(volume_discount(5), 5);
        assert_eq!(volume_discount(19), 10);
        assert_eq!(volume_discount(50), 15);
    }

    #[test]
    fn test_single_user_monthly() {
        let q = quote(1, 1);
        assert_eq!(q.plan, PlanId::Start);
        assert_eq!(q.discount_percent, 0);
        assert_eq!(q.price_per_user, 890);
        assert_eq!(q.total_payment, 890);
    }

    #[test]
    fn test_combined_discount_is_capped() {
        // 15% prepay + 15% volume = 30%, capped at 28%
        let q = quote(20, 12);
        assert_eq!(q.plan, PlanId::Corp);
        assert_eq!(q.discount_percent, 28);
        assert_eq!(q.price_per_user, 497); // 690 * 0.72 = 496.8
        assert_eq!(q.total_monthly, 497 * 20);
        assert_eq!(q.total_payment, 497 * 20 * 12);
    }

    #[test]
    fn test_quarterly_business() {
        let q = quote(10, 3);
        assert_eq!(q.plan, PlanId::Business);
        assert_eq!(q.discount_percent, 15);
        assert_eq!(q.price_per_user, 672); // 790 * 0.85 = 671.5
        assert_eq!(q.total_payment, 672 * 10 * 3);
    }

    #[test]
    fn test_huge_order_saturates() {
        let q = quote(u32::MAX, u32::MAX);
        assert_eq!(q.plan, PlanId::Corp);
        assert_eq!(q.total_monthly, q.price_per_user * u64::from(u32::MAX));
        assert_eq!(q.total_payment, u64::MAX);
    }
}

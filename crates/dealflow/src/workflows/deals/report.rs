use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::domain::{Deal, DealStatus, PayoutStatus, UserId};

/// Monthly sales target for one representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub user_id: UserId,
    pub current_month_target: Decimal,
    #[serde(default)]
    pub performance_rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepPerformance {
    pub user_id: UserId,
    pub target: Decimal,
    pub achieved: Decimal,
    /// `None` when the representative has no positive target.
    pub achievement_pct: Option<Decimal>,
    pub approved_deals: usize,
    pub pending_incentive: Decimal,
    pub paid_incentive: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_rating: Option<u8>,
}

impl RepPerformance {
    fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            target: Decimal::ZERO,
            achieved: Decimal::ZERO,
            achievement_pct: None,
            approved_deals: 0,
            pending_incentive: Decimal::ZERO,
            paid_incentive: Decimal::ZERO,
            performance_rating: None,
        }
    }
}

/// Approved-deal totals per representative for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub year: i32,
    pub month: u32,
    pub entries: Vec<RepPerformance>,
}

impl PerformanceReport {
    /// Only deals approved within the month of `month` count. Representatives with a
    /// target but no deals still appear, as do representatives with deals but no target.
    pub fn build(targets: &[Target], deals: &[Deal], month: NaiveDate) -> Self {
        let mut entries: BTreeMap<UserId, RepPerformance> = BTreeMap::new();

        for target in targets {
            let entry = entries
                .entry(target.user_id.clone())
                .or_insert_with(|| RepPerformance::empty(target.user_id.clone()));
            entry.target = target.current_month_target;
            entry.performance_rating = target.performance_rating;
        }

        let in_month = |deal: &&Deal| {
            deal.status == DealStatus::Approved
                && deal.decided_at.is_some_and(|decided| {
                    let day = decided.date_naive();
                    day.year() == month.year() && day.month() == month.month()
                })
        };

        for deal in deals.iter().filter(in_month) {
            let Some(owner) = deal.assigned_user_id.clone() else {
                continue;
            };
            let entry = entries
                .entry(owner.clone())
                .or_insert_with(|| RepPerformance::empty(owner));
            entry.achieved += deal.amount;
            entry.approved_deals += 1;
            match deal.payout_status {
                Some(PayoutStatus::Paid) => entry.paid_incentive += deal.incentive,
                _ => entry.pending_incentive += deal.incentive,
            }
        }

        let entries = entries
            .into_values()
            .map(|mut entry| {
                entry.achievement_pct = achievement(entry.achieved, entry.target);
                entry
            })
            .collect();

        Self {
            year: month.year(),
            month: month.month(),
            entries,
        }
    }
}

fn achievement(achieved: Decimal, target: Decimal) -> Option<Decimal> {
    if target <= Decimal::ZERO {
        return None;
    }
    let ratio = achieved.checked_mul(Decimal::ONE_HUNDRED)?.checked_div(target)?;
    let mut pct = ratio.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    pct.rescale(2);
    Some(pct)
}

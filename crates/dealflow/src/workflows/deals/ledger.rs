use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{Actor, Deal, DealId, DealStatus, PayoutStatus, UserId};
use super::machine::{self, IllegalTransition};
use super::repository::{DealCommit, DealFilter, DealRepository, RepositoryError};

/// Stale payout writes retried per deal before it is reported as skipped.
const MAX_PAYOUT_ATTEMPTS: usize = 3;

/// An approved deal viewed as an amount owed to a representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutRecord {
    pub deal_id: DealId,
    pub user_id: UserId,
    pub title: String,
    pub amount: Decimal,
    pub incentive: Decimal,
    pub currency: String,
    pub payout_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PayoutRecord {
    fn from_deal(deal: &Deal) -> Self {
        Self {
            deal_id: deal.id.clone(),
            user_id: deal
                .assigned_user_id
                .clone()
                .unwrap_or_else(|| deal.created_by.clone()),
            title: deal.title.clone(),
            amount: deal.amount,
            incentive: deal.incentive,
            currency: deal.currency.clone(),
            payout_status: deal
                .payout_status
                .map_or(PayoutStatus::Pending.label(), PayoutStatus::label),
            decided_at: deal.decided_at,
            paid_at: deal.paid_at,
        }
    }
}

/// Totals across all approved deals. Incentives are summed as plain amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutSummary {
    pub total_pending: Decimal,
    pub pending_count: usize,
    pub total_paid: Decimal,
    pub paid_count: usize,
}

/// Per-deal result of a batch payout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkPaidOutcome {
    pub updated: usize,
    pub paid: Vec<DealId>,
    pub skipped: Vec<DealId>,
}

/// Read model and payout marking over approved deals.
pub struct PayoutLedger<R> {
    repository: Arc<R>,
}

impl<R> PayoutLedger<R>
where
    R: DealRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn list_pending(&self) -> Result<Vec<PayoutRecord>, RepositoryError> {
        self.records(PayoutStatus::Pending)
    }

    pub fn list_paid(&self) -> Result<Vec<PayoutRecord>, RepositoryError> {
        self.records(PayoutStatus::Paid)
    }

    pub fn summary(&self) -> Result<PayoutSummary, RepositoryError> {
        let approved = self.repository.list(DealFilter::Status(DealStatus::Approved))?;

        let mut summary = PayoutSummary {
            total_pending: Decimal::ZERO,
            pending_count: 0,
            total_paid: Decimal::ZERO,
            paid_count: 0,
        };
        for deal in &approved {
            if deal.is_payout(PayoutStatus::Paid) {
                summary.total_paid += deal.incentive;
                summary.paid_count += 1;
            } else if deal.is_payout(PayoutStatus::Pending) {
                summary.total_pending += deal.incentive;
                summary.pending_count += 1;
            }
        }
        summary.total_pending.rescale(2);
        summary.total_paid.rescale(2);
        Ok(summary)
    }

    /// Mark each eligible deal paid in its own commit. Ineligible, unknown, and
    /// repeated ids are skipped without affecting the rest of the batch.
    pub fn mark_paid(
        &self,
        actor: &Actor,
        deal_ids: &[DealId],
    ) -> Result<MarkPaidOutcome, IllegalTransition> {
        if !actor.is_admin() {
            return Err(IllegalTransition::new(
                DealStatus::Approved,
                "mark_paid",
                "requires the admin role",
            ));
        }

        let mut outcome = MarkPaidOutcome::default();
        let mut seen = HashSet::new();
        for deal_id in deal_ids {
            if !seen.insert(deal_id) {
                outcome.skipped.push(deal_id.clone());
                continue;
            }
            match self.mark_one(deal_id) {
                Ok(true) => outcome.paid.push(deal_id.clone()),
                Ok(false) => outcome.skipped.push(deal_id.clone()),
                Err(error) => {
                    warn!(deal_id = %deal_id, %error, "payout not recorded");
                    outcome.skipped.push(deal_id.clone());
                }
            }
        }
        outcome.updated = outcome.paid.len();

        info!(
            actor = %actor.user_id,
            requested = deal_ids.len(),
            updated = outcome.updated,
            skipped = outcome.skipped.len(),
            "payout batch processed"
        );
        Ok(outcome)
    }

    fn mark_one(&self, deal_id: &DealId) -> Result<bool, RepositoryError> {
        for _ in 0..MAX_PAYOUT_ATTEMPTS {
            let Some(current) = self.repository.fetch(deal_id)? else {
                return Ok(false);
            };
            let Some(transition) = machine::mark_paid(&current, Utc::now()) else {
                return Ok(false);
            };

            let commit = DealCommit {
                expected_version: current.version,
                deal: transition.deal,
                events: transition.events,
            };
            match self.repository.commit(commit) {
                Ok(_) => return Ok(true),
                Err(RepositoryError::VersionConflict { .. }) => continue,
                Err(error) => return Err(error),
            }
        }
        Err(RepositoryError::Unavailable(format!(
            "deal {deal_id} kept changing during payout"
        )))
    }

    fn records(&self, payout: PayoutStatus) -> Result<Vec<PayoutRecord>, RepositoryError> {
        Ok(self
            .repository
            .list(DealFilter::Payout(payout))?
            .iter()
            .map(PayoutRecord::from_deal)
            .collect())
    }
}

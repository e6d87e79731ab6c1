use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::domain::{Actor, Deal, DealChanges, DealEvent, DealId, NewDeal};
use super::ledger::{MarkPaidOutcome, PayoutLedger, PayoutRecord, PayoutSummary};
use super::machine::{self, CreateError, IllegalTransition, Transition};
use super::outbox::{OutboxRelay, RelayReport};
use super::policy::{
    compute, CalculationError, IncentivePolicy, PolicyError, PolicyId, PolicyResolver,
    ResolutionSource, ResolvedPolicy,
};
use super::report::{PerformanceReport, Target};
use super::repository::{
    DealCommit, DealFilter, DealRepository, NotificationPublisher, PolicyStore, RepositoryError,
};
use crate::config::IncentiveConfig;

/// Optimistic commits retried before a contended write is reported as illegal.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Single entry point for deal mutations: creation, edits, lifecycle transitions, and
/// payout marking. Each mutation is one optimistic, version-checked commit per deal.
pub struct DealWorkflowService<R, P, N> {
    repository: Arc<R>,
    policies: Arc<P>,
    relay: OutboxRelay<R, N>,
    ledger: PayoutLedger<R>,
    resolver: PolicyResolver,
    default_currency: String,
}

impl<R, P, N> DealWorkflowService<R, P, N>
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        policies: Arc<P>,
        publisher: Arc<N>,
        config: IncentiveConfig,
    ) -> Self {
        Self {
            relay: OutboxRelay::new(repository.clone(), publisher),
            ledger: PayoutLedger::new(repository.clone()),
            resolver: PolicyResolver::new(config.tie_break),
            default_currency: config.default_currency,
            repository,
            policies,
        }
    }

    /// Record a new deal with its initial incentive.
    pub fn create_deal(&self, actor: &Actor, new_deal: NewDeal) -> Result<Deal, DealServiceError> {
        let mut deal = machine::create(new_deal, actor, &self.default_currency, Utc::now())?;
        let resolved = self.resolve_for(&deal)?;
        deal.incentive = compute(deal.amount, &resolved)?;

        let stored = self.repository.insert(deal)?;
        info!(
            deal_id = %stored.id,
            actor = %actor.user_id,
            status = stored.status.label(),
            incentive = %stored.incentive,
            "deal created"
        );
        Ok(stored)
    }

    pub fn get(&self, deal_id: &DealId) -> Result<Deal, DealServiceError> {
        self.repository
            .fetch(deal_id)?
            .ok_or_else(|| DealServiceError::DealNotFound(deal_id.clone()))
    }

    pub fn list(&self, filter: DealFilter) -> Result<Vec<Deal>, DealServiceError> {
        Ok(self.repository.list(filter)?)
    }

    /// Apply a lifecycle event on behalf of `actor`.
    pub fn transition(
        &self,
        deal_id: &DealId,
        event: DealEvent,
        actor: &Actor,
    ) -> Result<Deal, DealServiceError> {
        let result = self.commit_with_retry(deal_id, event.label(), |current| {
            let mut transition = machine::apply(current, &event, actor, Utc::now())?;
            if matches!(event, DealEvent::Submit) {
                let resolved = self.resolve_for(&transition.deal)?;
                transition.deal.incentive = compute(transition.deal.amount, &resolved)?;
            }
            Ok(Some(transition))
        });

        match &result {
            Ok(deal) => info!(
                deal_id = %deal.id,
                actor = %actor.user_id,
                event = event.label(),
                status = deal.status.label(),
                "deal transition applied"
            ),
            Err(error) => warn!(
                deal_id = %deal_id,
                actor = %actor.user_id,
                event = event.label(),
                %error,
                "deal transition rejected"
            ),
        }
        result
    }

    /// Change amount and/or policy binding on an open deal and recompute its incentive.
    pub fn update_terms(
        &self,
        deal_id: &DealId,
        actor: &Actor,
        changes: DealChanges,
    ) -> Result<Deal, DealServiceError> {
        if let Some(amount) = changes.amount {
            if amount <= Decimal::ZERO {
                return Err(DealServiceError::InvalidAmount {
                    amount,
                    requirement: "must be positive",
                });
            }
        }

        self.commit_with_retry(deal_id, "edit", |current| {
            machine::ensure_editable(current, actor)?;

            let mut next = current.clone();
            if let Some(amount) = changes.amount {
                next.amount = amount;
            }
            if changes.clear_policy {
                next.policy_id = None;
            }
            if let Some(policy_id) = changes.policy_id {
                next.policy_id = Some(policy_id);
            }

            let resolved = self.resolve_for(&next)?;
            next.incentive = compute(next.amount, &resolved)?;
            next.updated_at = Utc::now();
            Ok(Some(Transition {
                deal: next,
                events: Vec::new(),
            }))
        })
    }

    /// Re-resolve the policy and overwrite the incentive. Decided deals are returned as-is.
    pub fn recompute_incentive(&self, deal_id: &DealId) -> Result<Deal, DealServiceError> {
        self.commit_with_retry(deal_id, "recompute", |current| {
            if current.is_terminal() {
                debug!(deal_id = %current.id, "incentive frozen on decided deal");
                return Ok(None);
            }

            let resolved = self.resolve_for(current)?;
            let incentive = compute(current.amount, &resolved)?;
            if incentive == current.incentive {
                return Ok(None);
            }

            let mut next = current.clone();
            next.incentive = incentive;
            next.updated_at = Utc::now();
            Ok(Some(Transition {
                deal: next,
                events: Vec::new(),
            }))
        })
    }

    /// Deals are never removed; this always fails.
    pub fn delete_deal(&self, deal_id: &DealId) -> Result<(), DealServiceError> {
        let deal = self.get(deal_id)?;
        Err(machine::delete(&deal).into())
    }

    pub fn resolve_policy(&self, deal_id: &DealId) -> Result<ResolvedPolicy, DealServiceError> {
        let deal = self.get(deal_id)?;
        self.resolve_for(&deal)
    }

    /// Resolve the applicable policy for an in-memory deal. The bound policy is looked
    /// up by id even when the store no longer offers it as a candidate.
    pub fn resolve_for(&self, deal: &Deal) -> Result<ResolvedPolicy, DealServiceError> {
        let mut candidates = self.policies.candidates()?;
        if let Some(policy_id) = deal.policy_id {
            if !candidates.iter().any(|policy| policy.id == policy_id) {
                if let Some(policy) = self.policies.fetch(policy_id)? {
                    candidates.push(policy);
                }
            }
        }

        let resolved = self.resolver.resolve(deal, &candidates)?;
        if let ResolutionSource::Fallback { reason } = &resolved.source {
            if let Some(policy_id) = reason.unresolved_policy() {
                warn!(
                    deal_id = %deal.id,
                    policy_id = %policy_id,
                    reason = ?reason,
                    "PolicyNotFound: bound policy not applicable, using default tiered rule"
                );
            }
        }
        Ok(resolved)
    }

    /// Any policy by id, including inactive ones.
    pub fn get_policy(&self, policy_id: PolicyId) -> Result<IncentivePolicy, DealServiceError> {
        self.policies
            .fetch(policy_id)?
            .ok_or(DealServiceError::PolicyNotFound(policy_id))
    }

    pub fn mark_paid(
        &self,
        actor: &Actor,
        deal_ids: &[DealId],
    ) -> Result<MarkPaidOutcome, DealServiceError> {
        let outcome = self.ledger.mark_paid(actor, deal_ids)?;
        self.publish_pending();
        Ok(outcome)
    }

    pub fn list_pending(&self) -> Result<Vec<PayoutRecord>, DealServiceError> {
        Ok(self.ledger.list_pending()?)
    }

    pub fn list_paid(&self) -> Result<Vec<PayoutRecord>, DealServiceError> {
        Ok(self.ledger.list_paid()?)
    }

    pub fn summary(&self) -> Result<PayoutSummary, DealServiceError> {
        Ok(self.ledger.summary()?)
    }

    pub fn performance(
        &self,
        targets: &[Target],
        month: NaiveDate,
    ) -> Result<PerformanceReport, DealServiceError> {
        let deals = self.repository.list(DealFilter::All)?;
        Ok(PerformanceReport::build(targets, &deals, month))
    }

    /// Push queued domain events to the publisher. Runs after every successful commit.
    pub fn flush_outbox(&self) -> Result<RelayReport, DealServiceError> {
        Ok(self.relay.flush()?)
    }

    fn publish_pending(&self) {
        match self.relay.flush() {
            Ok(report) if report.failed > 0 => {
                warn!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "domain events left in outbox"
                )
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "outbox flush failed"),
        }
    }

    fn commit_with_retry<F>(
        &self,
        deal_id: &DealId,
        event: &'static str,
        mut step: F,
    ) -> Result<Deal, DealServiceError>
    where
        F: FnMut(&Deal) -> Result<Option<Transition>, DealServiceError>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let current = self.get(deal_id)?;
            let Some(Transition { deal, events }) = step(&current)? else {
                return Ok(current);
            };

            let commit = DealCommit {
                expected_version: current.version,
                deal,
                events,
            };
            match self.repository.commit(commit) {
                Ok(stored) => {
                    self.publish_pending();
                    return Ok(stored);
                }
                Err(RepositoryError::VersionConflict { expected, found }) => {
                    debug!(
                        deal_id = %deal_id,
                        event,
                        attempt,
                        expected,
                        found,
                        "stale deal write, retrying"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        let current = self.get(deal_id)?;
        Err(
            IllegalTransition::new(current.status, event, "deal is being modified concurrently")
                .into(),
        )
    }
}

/// Error raised by the deal workflow service.
#[derive(Debug, thiserror::Error)]
pub enum DealServiceError {
    #[error("invalid deal amount {amount}: {requirement}")]
    InvalidAmount {
        amount: Decimal,
        requirement: &'static str,
    },
    #[error(transparent)]
    InvalidPolicyConfig(#[from] PolicyError),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("incentive policy {0} not found")]
    PolicyNotFound(PolicyId),
    #[error("deal {0} not found")]
    DealNotFound(DealId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl DealServiceError {
    pub const fn kind(&self) -> &'static str {
        match self {
            DealServiceError::InvalidAmount { .. } => "invalid_amount",
            DealServiceError::InvalidPolicyConfig(_) => "invalid_policy_config",
            DealServiceError::IllegalTransition(_) => "illegal_transition",
            DealServiceError::PolicyNotFound(_) => "policy_not_found",
            DealServiceError::DealNotFound(_) => "deal_not_found",
            DealServiceError::Repository(_) => "repository",
        }
    }
}

impl From<CalculationError> for DealServiceError {
    fn from(value: CalculationError) -> Self {
        match value {
            CalculationError::InvalidAmount { amount } => Self::InvalidAmount {
                amount,
                requirement: "must not be negative",
            },
            CalculationError::Overflow { amount } => Self::InvalidAmount {
                amount,
                requirement: "incentive exceeds the representable range",
            },
        }
    }
}

impl From<CreateError> for DealServiceError {
    fn from(value: CreateError) -> Self {
        match value {
            CreateError::InvalidAmount { amount } => Self::InvalidAmount {
                amount,
                requirement: "must be positive",
            },
            CreateError::Forbidden(illegal) => Self::IllegalTransition(illegal),
        }
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{Deal, DealId, DealStatus, DomainEvent, PayoutStatus, UserId};
use super::policy::{IncentivePolicy, PolicyId};

/// Stable identifier of an outbox entry: `<deal>:v<version>:<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn for_commit(deal_id: &DealId, version: u64, index: usize) -> Self {
        Self(format!("{deal_id}:v{version}:{index}"))
    }
}

/// Domain event recorded alongside the deal write that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: EventId,
    pub event: DomainEvent,
    pub recorded_at: DateTime<Utc>,
}

/// A single-deal unit of work: the new deal state plus the events it emits.
#[derive(Debug, Clone)]
pub struct DealCommit {
    pub deal: Deal,
    pub expected_version: u64,
    pub events: Vec<DomainEvent>,
}

/// Which deals a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealFilter {
    All,
    Status(DealStatus),
    Payout(PayoutStatus),
}

impl DealFilter {
    pub fn matches(&self, deal: &Deal) -> bool {
        match self {
            DealFilter::All => true,
            DealFilter::Status(status) => deal.status == *status,
            DealFilter::Payout(payout) => deal.is_payout(*payout),
        }
    }
}

/// Storage for deals and their event outbox.
///
/// `commit` must be atomic per deal: compare `expected_version` with the stored version,
/// write the deal with `expected_version + 1`, and append `events` to the outbox, or do
/// nothing at all.
pub trait DealRepository: Send + Sync {
    fn insert(&self, deal: Deal) -> Result<Deal, RepositoryError>;
    fn fetch(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError>;
    fn commit(&self, commit: DealCommit) -> Result<Deal, RepositoryError>;
    fn list(&self, filter: DealFilter) -> Result<Vec<Deal>, RepositoryError>;
    /// Oldest undelivered entries, including ones currently claimed by a relay.
    fn undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError>;
    /// Reserve up to `limit` unclaimed entries for one relay pass. A claimed entry is
    /// never handed out again until it is released.
    fn claim_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError>;
    fn mark_delivered(&self, ids: &[EventId]) -> Result<(), RepositoryError>;
    /// Return claimed entries to the queue after a failed delivery.
    fn release(&self, ids: &[EventId]) -> Result<(), RepositoryError>;
}

/// Read-only source of incentive policies.
pub trait PolicyStore: Send + Sync {
    /// Policies eligible for resolution. Implementations may pre-filter to active ones.
    fn candidates(&self) -> Result<Vec<IncentivePolicy>, RepositoryError>;
    /// Any policy by id, active or not.
    fn fetch(&self, id: PolicyId) -> Result<Option<IncentivePolicy>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook for the notification subsystem.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, entry: &OutboxEntry) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Sanitized representation of a deal for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct DealStatusView {
    pub deal_id: DealId,
    pub status: &'static str,
    pub amount: Decimal,
    pub currency: String,
    pub incentive: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub version: u64,
}

impl Deal {
    pub fn status_view(&self) -> DealStatusView {
        DealStatusView {
            deal_id: self.id.clone(),
            status: self.status.label(),
            amount: self.amount,
            currency: self.currency.clone(),
            incentive: self.incentive,
            policy_id: self.policy_id,
            assigned_user_id: self.assigned_user_id.clone(),
            payout_status: self.payout_status.map(PayoutStatus::label),
            admin_comment: self.admin_comment.clone(),
            rejection_reason: self.rejection_reason.clone(),
            version: self.version,
        }
    }
}

//! Deal lifecycle, incentive resolution, and payout tracking.
//!
//! Every mutation flows through [`DealWorkflowService`], which pairs the pure status
//! machine with a version-checked repository commit and an event outbox. Policies are
//! read through [`PolicyStore`]; payouts and reports are projections over stored deals.

pub mod domain;
pub mod ledger;
pub mod machine;
pub mod memory;
pub mod outbox;
pub mod policy;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Actor, Deal, DealChanges, DealEvent, DealId, DealStatus, DomainEvent, NewDeal,
    PayoutStatus, Priority, Role, UserId,
};
pub use ledger::{MarkPaidOutcome, PayoutLedger, PayoutRecord, PayoutSummary};
pub use machine::{CreateError, IllegalTransition, Transition};
pub use memory::InMemoryDealRepository;
pub use outbox::{OutboxRelay, RelayReport};
pub use policy::{
    compute, CalculationError, CatalogError, CommissionRule, FallbackReason, IncentivePolicy,
    PolicyCatalog, PolicyError, PolicyId, PolicyResolver, ResolutionSource, ResolvedPolicy,
    TieBreakRule,
};
pub use report::{PerformanceReport, RepPerformance, Target};
pub use repository::{
    DealCommit, DealFilter, DealRepository, DealStatusView, EventId, NotificationError,
    NotificationPublisher, OutboxEntry, PolicyStore, RepositoryError,
};
pub use router::deal_router;
pub use service::{DealServiceError, DealWorkflowService};

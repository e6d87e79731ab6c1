use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::config::IncentiveConfig;
use crate::workflows::deals::domain::{Actor, Deal, DealEvent, DealId, NewDeal};
use crate::workflows::deals::memory::InMemoryDealRepository;
use crate::workflows::deals::policy::{IncentivePolicy, PolicyCatalog, PolicyId};
use crate::workflows::deals::repository::{
    DealCommit, DealFilter, DealRepository, EventId, NotificationError, NotificationPublisher,
    OutboxEntry, PolicyStore, RepositoryError,
};
use crate::workflows::deals::{deal_router, DealWorkflowService};

pub(super) type TestService =
    DealWorkflowService<InMemoryDealRepository, PolicyCatalog, MemoryPublisher>;

pub(super) fn sales() -> Actor {
    Actor::sales("rep-1")
}

pub(super) fn other_sales() -> Actor {
    Actor::sales("rep-2")
}

pub(super) fn admin() -> Actor {
    Actor::admin("admin-1")
}

/// Starter covers up to 25,000 at 4%; Growth covers 25,000.01..=150,000 at 8% with a
/// 5,000 bonus from 100,000; Legacy is retired.
pub(super) fn policies() -> Vec<IncentivePolicy> {
    vec![
        IncentivePolicy::new(1, "Starter", dec!(4)).with_bounds(Some(dec!(0)), Some(dec!(25000))),
        IncentivePolicy::new(2, "Growth", dec!(8))
            .with_bounds(Some(dec!(25000.01)), Some(dec!(150000)))
            .with_bonus(dec!(100000), dec!(5000)),
        IncentivePolicy::new(3, "Legacy", dec!(12)).inactive(),
    ]
}

pub(super) fn catalog() -> PolicyCatalog {
    PolicyCatalog::with_policies(policies()).expect("fixture policies are valid")
}

pub(super) fn build_service() -> (TestService, InMemoryDealRepository, Arc<MemoryPublisher>) {
    build_service_with(catalog())
}

pub(super) fn build_service_with(
    catalog: PolicyCatalog,
) -> (TestService, InMemoryDealRepository, Arc<MemoryPublisher>) {
    let repository = InMemoryDealRepository::default();
    let publisher = Arc::new(MemoryPublisher::default());
    let service = DealWorkflowService::new(
        Arc::new(repository.clone()),
        Arc::new(catalog),
        publisher.clone(),
        IncentiveConfig::default(),
    );
    (service, repository, publisher)
}

/// A sales-owned draft moved to `Submitted`.
pub(super) fn submitted_deal<R, P, N>(service: &DealWorkflowService<R, P, N>, amount: Decimal) -> Deal
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let deal = service
        .create_deal(&sales(), NewDeal::new("Fixture deal", amount))
        .expect("create succeeds");
    service
        .transition(&deal.id, DealEvent::Submit, &sales())
        .expect("submit succeeds")
}

pub(super) fn approved_deal<R, P, N>(service: &DealWorkflowService<R, P, N>, amount: Decimal) -> Deal
where
    R: DealRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationPublisher + 'static,
{
    let deal = submitted_deal(service, amount);
    service
        .transition(&deal.id, DealEvent::Approve { comment: None }, &admin())
        .expect("approve succeeds")
}

#[derive(Default)]
pub(super) struct MemoryPublisher {
    events: Mutex<Vec<OutboxEntry>>,
    offline: AtomicBool,
}

impl MemoryPublisher {
    pub(super) fn events(&self) -> Vec<OutboxEntry> {
        self.events.lock().expect("lock").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|entry| entry.event.name()).collect()
    }

    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl NotificationPublisher for MemoryPublisher {
    fn publish(&self, entry: &OutboxEntry) -> Result<(), NotificationError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("broker offline".to_string()));
        }
        self.events.lock().expect("lock").push(entry.clone());
        Ok(())
    }
}

/// Policy store that skips validation so broken configurations reach the resolver.
pub(super) struct RawPolicies(pub(super) Vec<IncentivePolicy>);

impl PolicyStore for RawPolicies {
    fn candidates(&self) -> Result<Vec<IncentivePolicy>, RepositoryError> {
        Ok(self.0.iter().filter(|policy| policy.active).cloned().collect())
    }

    fn fetch(&self, id: PolicyId) -> Result<Option<IncentivePolicy>, RepositoryError> {
        Ok(self.0.iter().find(|policy| policy.id == id).cloned())
    }
}

/// Commits a competing write before each of the first `interferences` commits, so
/// those commits see a stale version.
pub(super) struct InterferingRepository {
    pub(super) inner: InMemoryDealRepository,
    interferences: AtomicUsize,
}

impl InterferingRepository {
    pub(super) fn new(inner: InMemoryDealRepository, interferences: usize) -> Self {
        Self {
            inner,
            interferences: AtomicUsize::new(interferences),
        }
    }
}

impl DealRepository for InterferingRepository {
    fn insert(&self, deal: Deal) -> Result<Deal, RepositoryError> {
        self.inner.insert(deal)
    }

    fn fetch(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn commit(&self, commit: DealCommit) -> Result<Deal, RepositoryError> {
        let remaining = self.interferences.load(Ordering::SeqCst);
        if remaining > 0 {
            self.interferences.store(remaining - 1, Ordering::SeqCst);
            if let Some(mut current) = self.inner.fetch(&commit.deal.id)? {
                current.updated_at = Utc::now();
                let expected_version = current.version;
                self.inner.commit(DealCommit {
                    deal: current,
                    expected_version,
                    events: Vec::new(),
                })?;
            }
        }
        self.inner.commit(commit)
    }

    fn list(&self, filter: DealFilter) -> Result<Vec<Deal>, RepositoryError> {
        self.inner.list(filter)
    }

    fn undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        self.inner.undelivered(limit)
    }

    fn claim_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        self.inner.claim_undelivered(limit)
    }

    fn mark_delivered(&self, ids: &[EventId]) -> Result<(), RepositoryError> {
        self.inner.mark_delivered(ids)
    }

    fn release(&self, ids: &[EventId]) -> Result<(), RepositoryError> {
        self.inner.release(ids)
    }
}

pub(super) struct UnavailableRepository;

impl DealRepository for UnavailableRepository {
    fn insert(&self, _deal: Deal) -> Result<Deal, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _commit: DealCommit) -> Result<Deal, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: DealFilter) -> Result<Vec<Deal>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn undelivered(&self, _limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn claim_undelivered(&self, _limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn mark_delivered(&self, _ids: &[EventId]) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn release(&self, _ids: &[EventId]) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status);
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn deal_router_with_service(service: TestService) -> axum::Router {
    deal_router(Arc::new(service))
}

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{Deal, DealId};
use super::repository::{
    DealCommit, DealFilter, DealRepository, EventId, OutboxEntry, RepositoryError,
};

/// Process-local deal store. One mutex guards deals and outbox together, which makes
/// every `commit` a single atomic step. Delivered entries are dropped from the outbox.
#[derive(Default, Clone)]
pub struct InMemoryDealRepository {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    deals: HashMap<DealId, Deal>,
    outbox: VecDeque<OutboxEntry>,
    in_flight: HashSet<EventId>,
}

impl InMemoryDealRepository {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("deal store mutex poisoned".into()))
    }

    /// Entries not yet delivered, claimed or not, in commit order.
    pub fn pending_outbox(&self) -> Vec<OutboxEntry> {
        self.lock()
            .map(|state| state.outbox.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl DealRepository for InMemoryDealRepository {
    fn insert(&self, deal: Deal) -> Result<Deal, RepositoryError> {
        let mut state = self.lock()?;
        if state.deals.contains_key(&deal.id) {
            return Err(RepositoryError::Conflict);
        }
        state.deals.insert(deal.id.clone(), deal.clone());
        Ok(deal)
    }

    fn fetch(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.deals.get(id).cloned())
    }

    fn commit(&self, commit: DealCommit) -> Result<Deal, RepositoryError> {
        let DealCommit {
            mut deal,
            expected_version,
            events,
        } = commit;

        let mut state = self.lock()?;
        let found = state
            .deals
            .get(&deal.id)
            .map(|stored| stored.version)
            .ok_or(RepositoryError::NotFound)?;
        if found != expected_version {
            return Err(RepositoryError::VersionConflict {
                expected: expected_version,
                found,
            });
        }

        deal.version = expected_version + 1;
        let recorded_at = Utc::now();
        for (index, event) in events.into_iter().enumerate() {
            state.outbox.push_back(OutboxEntry {
                id: EventId::for_commit(&deal.id, deal.version, index),
                event,
                recorded_at,
            });
        }
        state.deals.insert(deal.id.clone(), deal.clone());
        Ok(deal)
    }

    fn list(&self, filter: DealFilter) -> Result<Vec<Deal>, RepositoryError> {
        let state = self.lock()?;
        let mut deals: Vec<Deal> = state
            .deals
            .values()
            .filter(|deal| filter.matches(deal))
            .cloned()
            .collect();
        deals.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(deals)
    }

    fn undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.outbox.iter().take(limit).cloned().collect())
    }

    fn claim_undelivered(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let mut state = self.lock()?;
        let MemoryState { outbox, in_flight, .. } = &mut *state;
        let claimed: Vec<OutboxEntry> = outbox
            .iter()
            .filter(|entry| !in_flight.contains(&entry.id))
            .take(limit)
            .cloned()
            .collect();
        in_flight.extend(claimed.iter().map(|entry| entry.id.clone()));
        Ok(claimed)
    }

    fn mark_delivered(&self, ids: &[EventId]) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let delivered: HashSet<&EventId> = ids.iter().collect();
        state.outbox.retain(|entry| !delivered.contains(&entry.id));
        state.in_flight.retain(|id| !delivered.contains(id));
        Ok(())
    }

    fn release(&self, ids: &[EventId]) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        for id in ids {
            state.in_flight.remove(id);
        }
        Ok(())
    }
}

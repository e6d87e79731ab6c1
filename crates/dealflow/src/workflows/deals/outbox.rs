use std::sync::Arc;

use tracing::{debug, warn};

use super::repository::{DealRepository, NotificationPublisher, RepositoryError};

const DEFAULT_BATCH_SIZE: usize = 64;

/// Delivers recorded domain events to the notification publisher.
///
/// Entries are only marked delivered after the publisher accepts them, so a crash
/// between commit and publish leaves the event queued rather than lost.
pub struct OutboxRelay<R, N> {
    repository: Arc<R>,
    publisher: Arc<N>,
    batch_size: usize,
}

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

impl<R, N> OutboxRelay<R, N>
where
    R: DealRepository,
    N: NotificationPublisher,
{
    pub fn new(repository: Arc<R>, publisher: Arc<N>) -> Self {
        Self {
            repository,
            publisher,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish everything pending. Entries are claimed before publishing, so relays
    /// running at the same time never hand the same entry to the publisher twice.
    /// Stops at the first batch containing a failure; failed entries are released and
    /// retried on the next pass instead of spinning.
    pub fn flush(&self) -> Result<RelayReport, RepositoryError> {
        let mut report = RelayReport::default();

        loop {
            let batch = self.repository.claim_undelivered(self.batch_size)?;
            if batch.is_empty() {
                break;
            }

            let mut delivered = Vec::with_capacity(batch.len());
            let mut failed = Vec::new();
            for entry in &batch {
                match self.publisher.publish(entry) {
                    Ok(()) => {
                        debug!(event_id = %entry.id.0, event = entry.event.name(), "domain event delivered");
                        delivered.push(entry.id.clone());
                    }
                    Err(error) => {
                        warn!(event_id = %entry.id.0, %error, "domain event delivery failed");
                        failed.push(entry.id.clone());
                    }
                }
            }

            report.delivered += delivered.len();
            report.failed += failed.len();
            self.repository.mark_delivered(&delivered)?;
            if !failed.is_empty() {
                self.repository.release(&failed)?;
            }

            if report.failed > 0 || batch.len() < self.batch_size {
                break;
            }
        }

        Ok(report)
    }
}

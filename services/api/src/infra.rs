use dealflow::config::IncentiveConfig;
use dealflow::error::AppError;
use dealflow::workflows::deals::{
    DomainEvent, NotificationError, NotificationPublisher, OutboxEntry, PolicyCatalog,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hands domain events to the notification channel by logging them. Keeps a copy of
/// every delivered entry so the demo can print what went out.
#[derive(Default, Clone)]
pub(crate) struct TracingNotificationPublisher {
    delivered: Arc<Mutex<Vec<OutboxEntry>>>,
}

impl TracingNotificationPublisher {
    pub(crate) fn delivered(&self) -> Vec<OutboxEntry> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for TracingNotificationPublisher {
    fn publish(&self, entry: &OutboxEntry) -> Result<(), NotificationError> {
        match &entry.event {
            DomainEvent::DealApproved {
                deal_id,
                user_id,
                incentive,
            }
            | DomainEvent::PayoutMarked {
                deal_id,
                user_id,
                incentive,
            } => info!(
                event_id = %entry.id.0,
                event = entry.event.name(),
                %deal_id,
                %user_id,
                %incentive,
                "notification dispatched"
            ),
            DomainEvent::DealRejected {
                deal_id,
                user_id,
                reason,
            } => info!(
                event_id = %entry.id.0,
                event = entry.event.name(),
                %deal_id,
                %user_id,
                reason = %reason,
                "notification dispatched"
            ),
        }

        self.delivered
            .lock()
            .map_err(|_| NotificationError::Transport("publisher mutex poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}

/// Load the configured CSV catalog. Without one the catalog is empty and every deal
/// resolves to the default tiered commission.
pub(crate) fn load_catalog(config: &IncentiveConfig) -> Result<PolicyCatalog, AppError> {
    match &config.policy_catalog {
        Some(path) => {
            let catalog = PolicyCatalog::from_path(path)?;
            info!(path = %path.display(), policies = catalog.len(), "policy catalog loaded");
            Ok(catalog)
        }
        None => {
            info!("no policy catalog configured, using default tiered commission");
            Ok(PolicyCatalog::new())
        }
    }
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim())
        .map_err(|err| format!("failed to parse '{raw}' as a decimal amount ({err})"))
}

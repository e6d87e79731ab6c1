use crate::infra::{load_catalog, parse_decimal, TracingNotificationPublisher};
use clap::Args;
use dealflow::config::IncentiveConfig;
use dealflow::error::AppError;
use dealflow::workflows::deals::{
    Actor, DealEvent, DealWorkflowService, InMemoryDealRepository, NewDeal,
};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Deal amount used for the walkthrough.
    #[arg(long, default_value = "75000", value_parser = parse_decimal)]
    pub(crate) amount: Decimal,
    /// Comment recorded with the approval.
    #[arg(long)]
    pub(crate) comment: Option<String>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { amount, comment } = args;

    let config = IncentiveConfig::default();
    let catalog = load_catalog(&config)?;
    let repository = Arc::new(InMemoryDealRepository::default());
    let publisher = Arc::new(TracingNotificationPublisher::default());
    let service = DealWorkflowService::new(
        repository,
        Arc::new(catalog),
        publisher.clone(),
        config,
    );

    let rep = Actor::sales("rep-demo");
    let admin = Actor::admin("admin-demo");

    println!("Deal lifecycle demo");
    let deal = service.create_deal(&rep, NewDeal::new("Demo deal", amount))?;
    println!(
        "- Created deal {} for {} {} -> status {}",
        deal.id, deal.amount, deal.currency, deal.status
    );

    let resolved = service.resolve_policy(&deal.id)?;
    println!(
        "  Policy: {}{}",
        resolved.title,
        resolved
            .policy_id
            .map(|id| format!(" (#{id})"))
            .unwrap_or_default()
    );

    let submitted = service.transition(&deal.id, DealEvent::Submit, &rep)?;
    println!(
        "- Submitted by {} -> incentive {}",
        rep.user_id, submitted.incentive
    );

    let approved = service.transition(&deal.id, DealEvent::Approve { comment }, &admin)?;
    println!(
        "- Approved by {} -> payout {}",
        admin.user_id,
        approved
            .payout_status
            .map(|status| status.label())
            .unwrap_or("n/a")
    );
    if let Some(comment) = &approved.admin_comment {
        println!("  Admin comment: {}", comment);
    }

    let outcome = service.mark_paid(&admin, &[deal.id.clone()])?;
    println!(
        "- Payout batch: {} updated, {} skipped",
        outcome.updated,
        outcome.skipped.len()
    );

    let stored = service.get(&deal.id)?;
    match serde_json::to_string_pretty(&stored.status_view()) {
        Ok(json) => println!("  Final status payload:\n{}", json),
        Err(err) => println!("  Final status payload unavailable: {}", err),
    }

    let delivered = publisher.delivered();
    if delivered.is_empty() {
        println!("  Notifications: none dispatched");
    } else {
        println!("  Notifications:");
        for entry in delivered {
            println!("    - {} ({})", entry.event.name(), entry.id.0);
        }
    }

    let summary = service.summary()?;
    println!(
        "Payout summary: pending {} across {} deals | paid {} across {} deals",
        summary.total_pending, summary.pending_count, summary.total_paid, summary.paid_count
    );

    Ok(())
}

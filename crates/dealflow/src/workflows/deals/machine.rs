//! Deal status transitions and their guards.
//!
//! Every function here is pure: it takes the current deal and returns either the next
//! deal plus the events it emits, or an [`IllegalTransition`] with the input untouched.
//! Persisting the result atomically is the service's job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::domain::{
    Actor, Deal, DealEvent, DealId, DealStatus, DomainEvent, NewDeal, PayoutStatus, Role, UserId,
};

/// An event that is not valid for the deal's current status or for the acting user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: cannot {event} a {from} deal ({reason})")]
pub struct IllegalTransition {
    pub from: DealStatus,
    pub event: &'static str,
    pub reason: String,
}

impl IllegalTransition {
    pub fn new(from: DealStatus, event: &'static str, reason: impl Into<String>) -> Self {
        Self {
            from,
            event,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateError {
    #[error("deal amount {amount} must be positive")]
    InvalidAmount { amount: Decimal },
    #[error(transparent)]
    Forbidden(IllegalTransition),
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub deal: Deal,
    pub events: Vec<DomainEvent>,
}

/// Build a new deal in `Draft` (sales) or `Assigned` (admin, who must name an assignee).
///
/// The incentive starts at zero; the caller computes it before persisting.
pub fn create(
    new_deal: NewDeal,
    actor: &Actor,
    default_currency: &str,
    now: DateTime<Utc>,
) -> Result<Deal, CreateError> {
    if new_deal.amount <= Decimal::ZERO {
        return Err(CreateError::InvalidAmount {
            amount: new_deal.amount,
        });
    }

    let (status, assigned_user_id) = match actor.role {
        Role::Sales => match new_deal.assigned_user_id {
            Some(assignee) if assignee != actor.user_id => {
                return Err(CreateError::Forbidden(IllegalTransition::new(
                    DealStatus::Draft,
                    "create",
                    format!(
                        "sales representative {} cannot create a deal for {}",
                        actor.user_id, assignee
                    ),
                )))
            }
            _ => (DealStatus::Draft, Some(actor.user_id.clone())),
        },
        Role::Admin => match new_deal.assigned_user_id {
            Some(assignee) => (DealStatus::Assigned, Some(assignee)),
            None => {
                return Err(CreateError::Forbidden(IllegalTransition::new(
                    DealStatus::Assigned,
                    "create",
                    "admin-created deals need an assigned representative",
                )))
            }
        },
    };

    let currency = new_deal
        .currency
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| default_currency.to_string());

    Ok(Deal {
        id: DealId::generate(),
        title: new_deal.title,
        amount: new_deal.amount,
        currency,
        status,
        incentive: Decimal::ZERO,
        policy_id: new_deal.policy_id,
        assigned_user_id,
        created_by: actor.user_id.clone(),
        priority: new_deal.priority,
        payout_status: None,
        admin_comment: None,
        rejection_reason: None,
        version: 0,
        created_at: now,
        updated_at: now,
        decided_at: None,
        paid_at: None,
    })
}

/// Apply a lifecycle event. On error the input deal is returned to the caller unchanged.
pub fn apply(
    deal: &Deal,
    event: &DealEvent,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Transition, IllegalTransition> {
    let label = event.label();
    let illegal = |reason: String| IllegalTransition::new(deal.status, label, reason);

    if deal.is_terminal() {
        return Err(illegal(format!("{} deals are final", deal.status)));
    }

    let mut next = deal.clone();
    next.updated_at = now;
    let mut events = Vec::new();

    match event {
        DealEvent::StartWork => {
            require_status(deal, &[DealStatus::Assigned, DealStatus::Draft], label)?;
            require_role(deal, actor, Role::Sales, label)?;
            if !deal.is_owned_by(&actor.user_id) {
                return Err(illegal(format!(
                    "{} is not the assigned representative",
                    actor.user_id
                )));
            }
            next.status = DealStatus::InProgress;
        }
        DealEvent::Submit => {
            require_status(deal, &[DealStatus::InProgress, DealStatus::Draft], label)?;
            require_role(deal, actor, Role::Sales, label)?;
            if deal.amount <= Decimal::ZERO {
                return Err(illegal(format!("amount {} must be positive", deal.amount)));
            }
            match &deal.assigned_user_id {
                None => return Err(illegal("deal has no assigned representative".into())),
                Some(owner) if *owner != actor.user_id => {
                    return Err(illegal(format!(
                        "{} is not the assigned representative",
                        actor.user_id
                    )))
                }
                Some(_) => {}
            }
            next.status = DealStatus::Submitted;
        }
        DealEvent::Approve { comment } => {
            require_status(deal, &[DealStatus::Submitted], label)?;
            require_role(deal, actor, Role::Admin, label)?;
            let owner = submitted_owner(deal, label)?;
            next.status = DealStatus::Approved;
            next.payout_status = Some(PayoutStatus::Pending);
            next.admin_comment = comment
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            next.decided_at = Some(now);
            events.push(DomainEvent::DealApproved {
                deal_id: deal.id.clone(),
                user_id: owner,
                incentive: deal.incentive,
            });
        }
        DealEvent::Reject { reason } => {
            require_status(deal, &[DealStatus::Submitted], label)?;
            require_role(deal, actor, Role::Admin, label)?;
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(illegal("a rejection reason is required".into()));
            }
            let owner = submitted_owner(deal, label)?;
            next.status = DealStatus::Rejected;
            next.rejection_reason = Some(reason.to_string());
            next.decided_at = Some(now);
            events.push(DomainEvent::DealRejected {
                deal_id: deal.id.clone(),
                user_id: owner,
                reason: reason.to_string(),
            });
        }
    }

    Ok(Transition { deal: next, events })
}

/// Guard for edits to amount or policy binding.
pub fn ensure_editable(deal: &Deal, actor: &Actor) -> Result<(), IllegalTransition> {
    const EVENT: &str = "edit";

    if deal.is_terminal() {
        return Err(IllegalTransition::new(
            deal.status,
            EVENT,
            format!("{} deals are final", deal.status),
        ));
    }

    match actor.role {
        Role::Admin => Ok(()),
        Role::Sales if deal.status == DealStatus::Submitted => Err(IllegalTransition::new(
            deal.status,
            EVENT,
            "submitted deals can only be edited by an admin",
        )),
        Role::Sales if deal.is_owned_by(&actor.user_id) => Ok(()),
        Role::Sales => Err(IllegalTransition::new(
            deal.status,
            EVENT,
            format!("{} is not the assigned representative", actor.user_id),
        )),
    }
}

/// Move an approved, pending payout to paid. `None` means the deal is not eligible.
pub fn mark_paid(deal: &Deal, now: DateTime<Utc>) -> Option<Transition> {
    if !deal.is_payout(PayoutStatus::Pending) {
        return None;
    }
    let owner = deal.assigned_user_id.clone()?;

    let mut next = deal.clone();
    next.payout_status = Some(PayoutStatus::Paid);
    next.paid_at = Some(now);
    next.updated_at = now;

    Some(Transition {
        events: vec![DomainEvent::PayoutMarked {
            deal_id: deal.id.clone(),
            user_id: owner,
            incentive: deal.incentive,
        }],
        deal: next,
    })
}

/// Deletion is not part of the lifecycle; callers always get this error.
pub fn delete(deal: &Deal) -> IllegalTransition {
    IllegalTransition::new(deal.status, "delete", "deals are never deleted")
}

fn require_status(
    deal: &Deal,
    allowed: &[DealStatus],
    event: &'static str,
) -> Result<(), IllegalTransition> {
    if allowed.contains(&deal.status) {
        Ok(())
    } else {
        Err(IllegalTransition::new(
            deal.status,
            event,
            format!("not permitted from {}", deal.status),
        ))
    }
}

fn require_role(
    deal: &Deal,
    actor: &Actor,
    role: Role,
    event: &'static str,
) -> Result<(), IllegalTransition> {
    if actor.role == role {
        Ok(())
    } else {
        Err(IllegalTransition::new(
            deal.status,
            event,
            format!("requires the {} role", role.label()),
        ))
    }
}

fn submitted_owner(deal: &Deal, event: &'static str) -> Result<UserId, IllegalTransition> {
    deal.assigned_user_id
        .clone()
        .ok_or_else(|| IllegalTransition::new(deal.status, event, "deal has no owner"))
}

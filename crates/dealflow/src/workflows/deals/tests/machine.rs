use super::common::*;
use chrono::Utc;
use rust_decimal_macros::dec;

use crate::workflows::deals::domain::{
    Actor, Deal, DealEvent, DealStatus, DomainEvent, NewDeal, PayoutStatus, UserId,
};
use crate::workflows::deals::machine::{self, CreateError};

fn draft(actor: &Actor) -> Deal {
    machine::create(NewDeal::new("Renewal", dec!(40000)), actor, "INR", Utc::now())
        .expect("create succeeds")
}

fn assigned_to(user: &str) -> Deal {
    let mut new_deal = NewDeal::new("Assigned lead", dec!(12000));
    new_deal.assigned_user_id = Some(UserId::new(user));
    machine::create(new_deal, &admin(), "INR", Utc::now()).expect("create succeeds")
}

fn step(deal: &Deal, event: DealEvent, actor: &Actor) -> Deal {
    machine::apply(deal, &event, actor, Utc::now())
        .expect("transition is legal")
        .deal
}

fn submitted() -> Deal {
    step(&draft(&sales()), DealEvent::Submit, &sales())
}

#[test]
fn sales_create_drafts_owned_by_the_creator() {
    let deal = draft(&sales());
    assert_eq!(deal.status, DealStatus::Draft);
    assert_eq!(deal.assigned_user_id, Some(sales().user_id));
    assert_eq!(deal.created_by, sales().user_id);
    assert_eq!(deal.currency, "INR");
    assert_eq!(deal.version, 0);
    assert_eq!(deal.payout_status, None);
}

#[test]
fn admin_create_with_assignee_starts_assigned() {
    let deal = assigned_to("rep-1");
    assert_eq!(deal.status, DealStatus::Assigned);
    assert!(deal.is_owned_by(&UserId::new("rep-1")));
}

#[test]
fn admin_create_without_assignee_is_rejected() {
    let new_deal = NewDeal::new("Orphan", dec!(9000));
    match machine::create(new_deal, &admin(), "INR", Utc::now()) {
        Err(CreateError::Forbidden(error)) => {
            assert_eq!(error.event, "create");
            assert_eq!(error.from, DealStatus::Assigned);
        }
        other => panic!("expected forbidden create, got {other:?}"),
    }
}

#[test]
fn sales_cannot_create_deals_for_someone_else() {
    let mut new_deal = NewDeal::new("Poached", dec!(100));
    new_deal.assigned_user_id = Some(other_sales().user_id);
    match machine::create(new_deal, &sales(), "INR", Utc::now()) {
        Err(CreateError::Forbidden(error)) => assert_eq!(error.event, "create"),
        other => panic!("expected forbidden create, got {other:?}"),
    }
}

#[test]
fn create_rejects_non_positive_amounts() {
    for amount in [dec!(0), dec!(-10)] {
        let result = machine::create(NewDeal::new("Empty", amount), &sales(), "INR", Utc::now());
        assert_eq!(result, Err(CreateError::InvalidAmount { amount }));
    }
}

#[test]
fn create_normalizes_currency_codes() {
    let mut new_deal = NewDeal::new("Export", dec!(500));
    new_deal.currency = Some(" usd ".into());
    let deal = machine::create(new_deal, &sales(), "INR", Utc::now()).expect("create succeeds");
    assert_eq!(deal.currency, "USD");
}

#[test]
fn assigned_rep_starts_work_then_submits() {
    let rep = Actor::sales("rep-1");
    let deal = assigned_to("rep-1");

    let in_progress = step(&deal, DealEvent::StartWork, &rep);
    assert_eq!(in_progress.status, DealStatus::InProgress);

    let submitted = step(&in_progress, DealEvent::Submit, &rep);
    assert_eq!(submitted.status, DealStatus::Submitted);
}

#[test]
fn only_the_owner_may_start_work() {
    let deal = assigned_to("rep-1");
    for actor in [other_sales(), admin()] {
        let error = machine::apply(&deal, &DealEvent::StartWork, &actor, Utc::now())
            .expect_err("not the owner");
        assert_eq!(error.from, DealStatus::Assigned);
        assert_eq!(error.event, "start_work");
    }
}

#[test]
fn submit_requires_an_owner_and_an_open_status() {
    let mut unowned = draft(&sales());
    unowned.assigned_user_id = None;
    assert!(machine::apply(&unowned, &DealEvent::Submit, &sales(), Utc::now()).is_err());

    let assigned = assigned_to("rep-1");
    let error = machine::apply(&assigned, &DealEvent::Submit, &sales(), Utc::now())
        .expect_err("assigned deals must be started first");
    assert_eq!(error.from, DealStatus::Assigned);
}

#[test]
fn approve_opens_a_pending_payout_and_emits_event() {
    let mut deal = submitted();
    deal.incentive = dec!(2000.00);

    let transition = machine::apply(
        &deal,
        &DealEvent::Approve {
            comment: Some("  great work ".into()),
        },
        &admin(),
        Utc::now(),
    )
    .expect("approve is legal");

    assert_eq!(transition.deal.status, DealStatus::Approved);
    assert_eq!(transition.deal.payout_status, Some(PayoutStatus::Pending));
    assert_eq!(transition.deal.admin_comment.as_deref(), Some("great work"));
    assert!(transition.deal.decided_at.is_some());
    assert_eq!(
        transition.events,
        vec![DomainEvent::DealApproved {
            deal_id: deal.id.clone(),
            user_id: sales().user_id,
            incentive: dec!(2000.00),
        }]
    );
}

#[test]
fn blank_approval_comments_are_dropped() {
    let approved = step(
        &submitted(),
        DealEvent::Approve {
            comment: Some("   ".into()),
        },
        &admin(),
    );
    assert_eq!(approved.admin_comment, None);
}

#[test]
fn reject_requires_a_reason() {
    let deal = submitted();
    let blank = DealEvent::Reject {
        reason: "  ".into(),
    };
    assert!(machine::apply(&deal, &blank, &admin(), Utc::now()).is_err());

    let transition = machine::apply(
        &deal,
        &DealEvent::Reject {
            reason: "pricing below floor".into(),
        },
        &admin(),
        Utc::now(),
    )
    .expect("reject is legal");
    assert_eq!(transition.deal.status, DealStatus::Rejected);
    assert_eq!(transition.deal.payout_status, None);
    assert_eq!(
        transition.deal.rejection_reason.as_deref(),
        Some("pricing below floor")
    );
    assert!(matches!(
        transition.events.as_slice(),
        [DomainEvent::DealRejected { .. }]
    ));
}

#[test]
fn sales_cannot_decide_deals() {
    let deal = submitted();
    let error = machine::apply(&deal, &DealEvent::Approve { comment: None }, &sales(), Utc::now())
        .expect_err("sales cannot approve");
    assert_eq!(error.from, DealStatus::Submitted);
}

#[test]
fn terminal_deals_accept_no_events() {
    let approved = step(&submitted(), DealEvent::Approve { comment: None }, &admin());
    let rejected = step(
        &submitted(),
        DealEvent::Reject {
            reason: "duplicate".into(),
        },
        &admin(),
    );

    let events = [
        DealEvent::StartWork,
        DealEvent::Submit,
        DealEvent::Approve { comment: None },
        DealEvent::Reject {
            reason: "again".into(),
        },
    ];
    for deal in [&approved, &rejected] {
        for event in &events {
            for actor in [sales(), admin()] {
                let error = machine::apply(deal, event, &actor, Utc::now())
                    .expect_err("terminal deals are final");
                assert_eq!(error.from, deal.status);
            }
        }
    }
}

#[test]
fn edit_rules_follow_role_and_status() {
    let own_draft = draft(&sales());
    assert!(machine::ensure_editable(&own_draft, &sales()).is_ok());
    assert!(machine::ensure_editable(&own_draft, &other_sales()).is_err());
    assert!(machine::ensure_editable(&own_draft, &admin()).is_ok());

    let submitted = submitted();
    assert!(machine::ensure_editable(&submitted, &sales()).is_err());
    assert!(machine::ensure_editable(&submitted, &admin()).is_ok());

    let approved = step(&submitted, DealEvent::Approve { comment: None }, &admin());
    let error = machine::ensure_editable(&approved, &admin()).expect_err("approved is final");
    assert_eq!(error.event, "edit");
}

#[test]
fn mark_paid_only_moves_pending_payouts() {
    let approved = step(&submitted(), DealEvent::Approve { comment: None }, &admin());
    let transition = machine::mark_paid(&approved, Utc::now()).expect("pending payout");
    assert_eq!(transition.deal.payout_status, Some(PayoutStatus::Paid));
    assert!(transition.deal.paid_at.is_some());
    assert!(matches!(
        transition.events.as_slice(),
        [DomainEvent::PayoutMarked { .. }]
    ));

    assert!(machine::mark_paid(&transition.deal, Utc::now()).is_none());
    assert!(machine::mark_paid(&submitted(), Utc::now()).is_none());
}

#[test]
fn delete_is_never_legal() {
    for deal in [draft(&sales()), submitted()] {
        let error = machine::delete(&deal);
        assert_eq!(error.event, "delete");
        assert_eq!(error.from, deal.status);
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::PolicyId;

/// Opaque deal identifier, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub String);

impl DealId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a sales representative or administrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sales,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Sales => "sales",
            Role::Admin => "admin",
        }
    }
}

/// The caller on whose behalf an operation runs. Passed explicitly into every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn sales(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Sales,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Lifecycle status of a deal. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStatus {
    Draft,
    Assigned,
    InProgress,
    Submitted,
    Approved,
    Rejected,
}

impl DealStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DealStatus::Draft => "draft",
            DealStatus::Assigned => "assigned",
            DealStatus::InProgress => "in_progress",
            DealStatus::Submitted => "submitted",
            DealStatus::Approved => "approved",
            DealStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DealStatus::Approved | DealStatus::Rejected)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Informational only; the engine never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayoutStatus {
    Pending,
    Paid,
}

impl PayoutStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Paid => "PAID",
        }
    }
}

/// A sales deal tracked through approval and payout.
///
/// `incentive` is derived: the service recomputes it whenever `amount` or the bound
/// policy changes while the deal is open, and it never moves after the deal is decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: DealStatus,
    pub incentive: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<UserId>,
    pub created_by: UserId,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_status: Option<PayoutStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Deal {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.assigned_user_id.as_ref() == Some(user_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_payout(&self, payout_status: PayoutStatus) -> bool {
        self.status == DealStatus::Approved && self.payout_status == Some(payout_status)
    }
}

/// Fields accepted when a deal is first recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeal {
    #[serde(default)]
    pub title: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    #[serde(default)]
    pub assigned_user_id: Option<UserId>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewDeal {
    pub fn new(title: impl Into<String>, amount: Decimal) -> Self {
        Self {
            title: title.into(),
            amount,
            currency: None,
            policy_id: None,
            assigned_user_id: None,
            priority: Priority::default(),
        }
    }
}

/// Edits to the commission-relevant terms of an open deal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealChanges {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    /// Drop the explicit policy binding so the resolver derives one again.
    #[serde(default)]
    pub clear_policy: bool,
}

/// Events that move a deal between statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DealEvent {
    StartWork,
    Submit,
    Approve {
        #[serde(default)]
        comment: Option<String>,
    },
    Reject {
        #[serde(default)]
        reason: String,
    },
}

impl DealEvent {
    pub const fn label(&self) -> &'static str {
        match self {
            DealEvent::StartWork => "start_work",
            DealEvent::Submit => "submit",
            DealEvent::Approve { .. } => "approve",
            DealEvent::Reject { .. } => "reject",
        }
    }
}

/// Facts published to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    DealApproved {
        deal_id: DealId,
        user_id: UserId,
        incentive: Decimal,
    },
    DealRejected {
        deal_id: DealId,
        user_id: UserId,
        reason: String,
    },
    PayoutMarked {
        deal_id: DealId,
        user_id: UserId,
        incentive: Decimal,
    },
}

impl DomainEvent {
    pub fn deal_id(&self) -> &DealId {
        match self {
            DomainEvent::DealApproved { deal_id, .. }
            | DomainEvent::DealRejected { deal_id, .. }
            | DomainEvent::PayoutMarked { deal_id, .. } => deal_id,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            DomainEvent::DealApproved { .. } => "DealApproved",
            DomainEvent::DealRejected { .. } => "DealRejected",
            DomainEvent::PayoutMarked { .. } => "PayoutMarked",
        }
    }
}

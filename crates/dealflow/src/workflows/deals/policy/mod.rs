//! Incentive policies and the commission engine built on them.
//!
//! Resolution picks at most one policy for a deal (or the tiered fallback), and the
//! calculator turns the deal amount plus that resolution into a rounded incentive.
//! Both halves are pure and safe to call concurrently.

mod calculator;
pub mod catalog;
mod fallback;
mod resolver;

pub use calculator::{compute, CalculationError};
pub use catalog::{CatalogError, PolicyCatalog};
pub use fallback::{FALLBACK_HIGH_RATE, FALLBACK_LOW_RATE, FALLBACK_TIER_THRESHOLD};
pub use resolver::{PolicyResolver, TieBreakRule};

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Policy identifier. Lower ids were created earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub u64);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configurable commission rule applying to deals within an amount window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentivePolicy {
    pub id: PolicyId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Percentage between 0 and 100 inclusive.
    pub commission_rate: Decimal,
    #[serde(default)]
    pub min_deal_amount: Option<Decimal>,
    #[serde(default)]
    pub max_deal_amount: Option<Decimal>,
    #[serde(default)]
    pub bonus_threshold: Option<Decimal>,
    #[serde(default)]
    pub bonus_amount: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_active() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl IncentivePolicy {
    pub fn new(id: u64, title: impl Into<String>, commission_rate: Decimal) -> Self {
        Self {
            id: PolicyId(id),
            title: title.into(),
            description: String::new(),
            commission_rate,
            min_deal_amount: None,
            max_deal_amount: None,
            bonus_threshold: None,
            bonus_amount: None,
            active: true,
            version: 1,
        }
    }

    pub fn with_bounds(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_deal_amount = min;
        self.max_deal_amount = max;
        self
    }

    pub fn with_bonus(mut self, threshold: Decimal, amount: Decimal) -> Self {
        self.bonus_threshold = Some(threshold);
        self.bonus_amount = Some(amount);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::InvalidConfig {
            policy_id: self.id,
            reason,
        };

        if self.commission_rate < Decimal::ZERO || self.commission_rate > Decimal::ONE_HUNDRED {
            return Err(invalid(format!(
                "commission rate {} outside 0..=100",
                self.commission_rate
            )));
        }

        for (label, bound) in [
            ("minimum", self.min_deal_amount),
            ("maximum", self.max_deal_amount),
        ] {
            if let Some(value) = bound {
                if value < Decimal::ZERO {
                    return Err(invalid(format!("{label} deal amount {value} is negative")));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_deal_amount, self.max_deal_amount) {
            if min > max {
                return Err(invalid(format!(
                    "minimum deal amount {min} exceeds maximum {max}"
                )));
            }
        }

        if let Some(amount) = self.bonus_amount {
            if amount < Decimal::ZERO {
                return Err(invalid(format!("bonus amount {amount} is negative")));
            }
        }

        Ok(())
    }

    /// Inclusive window check; a missing bound is open on that side.
    pub fn covers(&self, amount: Decimal) -> bool {
        self.min_deal_amount.map_or(true, |min| amount >= min)
            && self.max_deal_amount.map_or(true, |max| amount <= max)
    }

    /// Width of the amount window, saturating to `Decimal::MAX` when either side is open.
    pub fn window_span(&self) -> Decimal {
        match (self.min_deal_amount, self.max_deal_amount) {
            (Some(min), Some(max)) => max.checked_sub(min).unwrap_or(Decimal::MAX),
            _ => Decimal::MAX,
        }
    }

    pub fn bonus_rule(&self) -> Option<BonusRule> {
        match (self.bonus_threshold, self.bonus_amount) {
            (Some(threshold), Some(amount)) => Some(BonusRule { threshold, amount }),
            _ => None,
        }
    }
}

/// Flat bonus added once the deal amount reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRule {
    pub threshold: Decimal,
    pub amount: Decimal,
}

/// How an incentive is derived from a deal amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommissionRule {
    /// 5% up to and including 50,000, 10% above. No bonus.
    Tiered,
    Flat {
        commission_rate: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bonus: Option<BonusRule>,
    },
}

/// Outcome of policy resolution for one deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    pub title: String,
    pub rule: CommissionRule,
    pub source: ResolutionSource,
}

impl ResolvedPolicy {
    pub fn fallback(reason: FallbackReason) -> Self {
        Self {
            policy_id: None,
            title: fallback::FALLBACK_TITLE.to_string(),
            rule: CommissionRule::Tiered,
            source: ResolutionSource::Fallback { reason },
        }
    }

    /// The tiered default rule, as selected when nothing else applies.
    pub fn default_fallback() -> Self {
        Self::fallback(FallbackReason::NoMatch)
    }

    pub fn from_policy(policy: &IncentivePolicy, source: ResolutionSource) -> Self {
        Self {
            policy_id: Some(policy.id),
            title: policy.title.clone(),
            rule: CommissionRule::Flat {
                commission_rate: policy.commission_rate,
                bonus: policy.bonus_rule(),
            },
            source,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ResolutionSource::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// The deal's own `policy_id` was applicable.
    Explicit,
    /// Exactly one active policy covered the amount.
    Matched,
    /// Several matched; the configured tie-break picked one.
    TieBroken { candidates: usize },
    Fallback { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "policy_id", rename_all = "snake_case")]
pub enum FallbackReason {
    NoMatch,
    PolicyNotFound(PolicyId),
    PolicyInactive(PolicyId),
    PolicyOutOfRange(PolicyId),
}

impl FallbackReason {
    /// The explicitly bound policy that could not be honored, if any.
    pub fn unresolved_policy(&self) -> Option<PolicyId> {
        match self {
            FallbackReason::NoMatch => None,
            FallbackReason::PolicyNotFound(id)
            | FallbackReason::PolicyInactive(id)
            | FallbackReason::PolicyOutOfRange(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid incentive policy {policy_id}: {reason}")]
    InvalidConfig { policy_id: PolicyId, reason: String },
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    FallbackReason, IncentivePolicy, PolicyError, PolicyId, ResolutionSource, ResolvedPolicy,
};
use crate::workflows::deals::domain::Deal;

/// Rule used when more than one active policy covers an unbound deal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakRule {
    /// Smallest `max - min` window wins (open sides count as the widest span),
    /// then the lowest id.
    #[default]
    NarrowestWindow,
    /// Earliest-created policy wins outright.
    LowestId,
}

impl TieBreakRule {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "narrowest_window" | "narrowest-window" | "narrowest" => Some(Self::NarrowestWindow),
            "lowest_id" | "lowest-id" | "earliest" => Some(Self::LowestId),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::NarrowestWindow => "narrowest_window",
            Self::LowestId => "lowest_id",
        }
    }
}

/// Selects the single applicable policy for a deal amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyResolver {
    tie_break: TieBreakRule,
}

impl PolicyResolver {
    pub fn new(tie_break: TieBreakRule) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreakRule {
        self.tie_break
    }

    pub fn resolve(
        &self,
        deal: &Deal,
        candidates: &[IncentivePolicy],
    ) -> Result<ResolvedPolicy, PolicyError> {
        self.resolve_amount(deal.amount, deal.policy_id, candidates)
    }

    /// Never fails for lack of a match; only an invalid candidate is an error.
    pub fn resolve_amount(
        &self,
        amount: Decimal,
        bound_policy: Option<PolicyId>,
        candidates: &[IncentivePolicy],
    ) -> Result<ResolvedPolicy, PolicyError> {
        for policy in candidates {
            policy.validate()?;
        }

        let applicable: Vec<&IncentivePolicy> = candidates
            .iter()
            .filter(|policy| policy.active && policy.covers(amount))
            .collect();

        if let Some(policy_id) = bound_policy {
            if let Some(policy) = applicable.iter().find(|policy| policy.id == policy_id) {
                return Ok(ResolvedPolicy::from_policy(policy, ResolutionSource::Explicit));
            }

            let reason = match candidates.iter().find(|policy| policy.id == policy_id) {
                None => FallbackReason::PolicyNotFound(policy_id),
                Some(policy) if !policy.active => FallbackReason::PolicyInactive(policy_id),
                Some(_) => FallbackReason::PolicyOutOfRange(policy_id),
            };
            return Ok(ResolvedPolicy::fallback(reason));
        }

        let winner = match applicable.as_slice() {
            [] => return Ok(ResolvedPolicy::default_fallback()),
            [only] => return Ok(ResolvedPolicy::from_policy(only, ResolutionSource::Matched)),
            many => match self.tie_break {
                TieBreakRule::NarrowestWindow => many
                    .iter()
                    .min_by_key(|policy| (policy.window_span(), policy.id)),
                TieBreakRule::LowestId => many.iter().min_by_key(|policy| policy.id),
            },
        };

        Ok(winner.map_or_else(ResolvedPolicy::default_fallback, |policy| {
            ResolvedPolicy::from_policy(
                policy,
                ResolutionSource::TieBroken {
                    candidates: applicable.len(),
                },
            )
        }))
    }
}

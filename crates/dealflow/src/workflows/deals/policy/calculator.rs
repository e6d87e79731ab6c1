use rust_decimal::{Decimal, RoundingStrategy};

use super::fallback::tiered_rate;
use super::{CommissionRule, ResolvedPolicy};

/// Minor-unit precision for every supported currency.
const MINOR_UNIT_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalculationError {
    #[error("deal amount {amount} must not be negative")]
    InvalidAmount { amount: Decimal },
    #[error("incentive for amount {amount} exceeds the representable range")]
    Overflow { amount: Decimal },
}

/// Incentive owed on `amount` under `resolved`, rounded half-up to two decimals.
pub fn compute(amount: Decimal, resolved: &ResolvedPolicy) -> Result<Decimal, CalculationError> {
    if amount < Decimal::ZERO {
        return Err(CalculationError::InvalidAmount { amount });
    }
    if amount.is_zero() {
        return Ok(Decimal::new(0, MINOR_UNIT_SCALE));
    }

    let overflow = || CalculationError::Overflow { amount };

    let (rate, bonus) = match &resolved.rule {
        CommissionRule::Tiered => (tiered_rate(amount), Decimal::ZERO),
        CommissionRule::Flat {
            commission_rate,
            bonus,
        } => {
            let bonus = (*bonus)
                .filter(|rule| amount >= rule.threshold)
                .map_or(Decimal::ZERO, |rule| rule.amount);
            (*commission_rate, bonus)
        }
    };

    let base = amount
        .checked_mul(rate)
        .and_then(|product| product.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(overflow)?;
    let total = base.checked_add(bonus).ok_or_else(overflow)?;

    let mut incentive =
        total.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    incentive.rescale(MINOR_UNIT_SCALE);
    Ok(incentive)
}

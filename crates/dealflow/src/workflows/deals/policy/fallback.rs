use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Deal amounts at or below this use the low rate; anything above uses the high rate.
pub const FALLBACK_TIER_THRESHOLD: Decimal = dec!(50000);
pub const FALLBACK_LOW_RATE: Decimal = dec!(5);
pub const FALLBACK_HIGH_RATE: Decimal = dec!(10);

pub(super) const FALLBACK_TITLE: &str = "Default tiered commission";

pub(super) fn tiered_rate(amount: Decimal) -> Decimal {
    if amount > FALLBACK_TIER_THRESHOLD {
        FALLBACK_HIGH_RATE
    } else {
        FALLBACK_LOW_RATE
    }
}

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary value half-up (away from zero) to 2 decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

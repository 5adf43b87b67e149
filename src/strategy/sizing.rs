//! ATR risk sizing.
//!
//! Risks a fixed fraction of cash per trade, with the stop placed
//! `atr_multiplier × ATR` away from entry:
//!
//!   quantity = floor(cash × risk_fraction / stop_distance / price)

use rust_decimal::prelude::*;
use tracing::debug;

use crate::types::{Bracket, Side};

/// Whole shares to buy. Zero whenever any input would make the division
/// meaningless (non-positive stop distance or price) or the result falls
/// outside `Decimal`/`u64` range.
pub fn position_size(
    cash: Decimal,
    risk_fraction: Decimal,
    stop_distance: Decimal,
    price: Decimal,
) -> u64 {
    if stop_distance <= Decimal::ZERO || price <= Decimal::ZERO || cash <= Decimal::ZERO {
        return 0;
    }
    let quantity = cash
        .checked_mul(risk_fraction)
        .and_then(|risk| risk.checked_div(stop_distance))
        .and_then(|per_unit| per_unit.checked_div(price))
        .and_then(|shares| shares.floor().to_u64())
        .unwrap_or(0);

    debug!(
        %cash,
        %risk_fraction,
        %stop_distance,
        %price,
        quantity,
        "Position sized"
    );
    quantity
}

/// Take-profit / stop-loss levels around `price`. For a buy the target is
/// above and the stop below; for a sell (closing a long) they are mirrored.
pub fn bracket(side: Side, price: Decimal, atr: Decimal, stop_distance: Decimal, take_profit_atr: Decimal) -> Bracket {
    let target = atr.saturating_mul(take_profit_atr);
    match side {
        Side::Buy => Bracket {
            take_profit: price.saturating_add(target),
            stop_loss: price.saturating_sub(stop_distance),
        },
        Side::Sell => Bracket {
            take_profit: price.saturating_sub(target),
            stop_loss: price.saturating_add(stop_distance),
        },
    }
}

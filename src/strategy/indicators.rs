//! Technical indicators over OHLC bars.
//!
//! All functions are pure and return `None` when the series is too short
//! for the requested window, so callers can skip a cycle instead of acting
//! on a half-formed average.

use rust_decimal::Decimal;

use crate::types::Bar;

/// Arithmetic mean of the last `window` closes.
pub fn sma(bars: &[Bar], window: usize) -> Option<Decimal> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let sum: Decimal = bars[bars.len() - window..].iter().map(|b| b.close).sum();
    Some(sum / Decimal::from(window as u64))
}

/// `max(high − low, |high − prior_close|, |low − prior_close|)`.
/// Without a prior close (first bar of a series) only `high − low` applies.
pub fn true_range(bar: &Bar, prior_close: Option<Decimal>) -> Decimal {
    let hl = bar.range();
    match prior_close {
        Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => hl,
    }
}

/// True range of every bar, same length as `bars`.
pub fn true_ranges(bars: &[Bar]) -> Vec<Decimal> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let prior = i.checked_sub(1).map(|j| bars[j].close);
            true_range(bar, prior)
        })
        .collect()
}

/// Average True Range: mean of the last `period` true ranges.
pub fn atr(bars: &[Bar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let tr = true_ranges(bars);
    let sum: Decimal = tr[tr.len() - period..].iter().copied().sum();
    Some(sum / Decimal::from(period as u64))
}

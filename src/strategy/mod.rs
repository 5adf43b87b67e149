//! Strategy engine — SMA crossover entries with ATR risk sizing.
//!
//! One symbol, long-only, never pyramids:
//!
//! ```text
//! FLAT --golden cross (short SMA > long SMA)--> LONG
//! LONG --death cross  (short SMA < long SMA)--> FLAT
//! ```
//!
//! The state is not stored here; it is read from the ledger each iteration
//! (held ⇒ LONG), so a rejected order leaves the engine where it was.

pub mod indicators;
pub mod sizing;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::PriceOracle;
use crate::engine::ledger::Ledger;
use crate::types::{Execution, Quote, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Invalid strategy configuration: {0}")]
    InvalidConfig(String),
}

/// Strategy parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub symbol: String,
    /// Fraction of cash put at risk per entry.
    pub risk_per_trade: Decimal,
    pub short_window: usize,
    pub long_window: usize,
    pub atr_period: usize,
    /// Stop distance = ATR × multiplier.
    pub atr_multiplier: Decimal,
    /// Extra bars fetched beyond each window so the average is fully formed.
    pub history_margin: usize,
    /// Take-profit distance in ATRs, recorded on each order's bracket.
    pub take_profit_atr: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            risk_per_trade: dec!(0.01),
            short_window: 50,
            long_window: 200,
            atr_period: 14,
            atr_multiplier: dec!(1.5),
            history_margin: 10,
            take_profit_atr: dec!(3),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), StrategyError> {
        let fail = |msg: String| Err(StrategyError::InvalidConfig(msg));

        if self.symbol.trim().is_empty() {
            return fail("symbol must not be empty".into());
        }
        if self.short_window == 0 || self.atr_period == 0 {
            return fail("windows and ATR period must be positive".into());
        }
        if self.short_window >= self.long_window {
            return fail(format!(
                "short_window ({}) must be below long_window ({})",
                self.short_window, self.long_window
            ));
        }
        if self.risk_per_trade <= Decimal::ZERO || self.risk_per_trade > Decimal::ONE {
            return fail(format!("risk_per_trade must be in (0, 1], got {}", self.risk_per_trade));
        }
        if self.atr_multiplier <= Decimal::ZERO {
            return fail(format!("atr_multiplier must be positive, got {}", self.atr_multiplier));
        }
        if self.take_profit_atr < Decimal::ZERO {
            return fail(format!("take_profit_atr must not be negative, got {}", self.take_profit_atr));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalState {
    Flat,
    Long,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalState::Flat => write!(f, "FLAT"),
            SignalState::Long => write!(f, "LONG"),
        }
    }
}

/// Which input was missing when a cycle was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ShortSma,
    LongSma,
    Atr,
    LastPrice,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ShortSma => write!(f, "short SMA unavailable"),
            SkipReason::LongSma => write!(f, "long SMA unavailable"),
            SkipReason::Atr => write!(f, "ATR unavailable"),
            SkipReason::LastPrice => write!(f, "last price unavailable"),
        }
    }
}

/// Indicator values a decision was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readings {
    pub short_sma: Decimal,
    pub long_sma: Decimal,
    pub atr: Decimal,
    pub last_price: Quote,
    pub stop_distance: Decimal,
}

/// What a single trading iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Insufficient data; nothing was decided.
    Skipped(SkipReason),
    /// No crossover condition applied.
    NoSignal(Readings),
    /// Golden cross, but risk sizing came out at zero shares.
    SizedToZero(Readings),
    /// Golden cross: a BUY was placed.
    Entered { readings: Readings, execution: Execution },
    /// Death cross: the whole position was offered for SELL.
    Exited { readings: Readings, execution: Execution },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct CrossoverTrader {
    config: StrategyConfig,
    ledger: Arc<Ledger>,
    oracle: Arc<dyn PriceOracle>,
}

impl CrossoverTrader {
    pub fn new(
        config: StrategyConfig,
        ledger: Arc<Ledger>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, StrategyError> {
        config.validate()?;
        info!(
            symbol = %config.symbol,
            short_window = config.short_window,
            long_window = config.long_window,
            atr_period = config.atr_period,
            atr_multiplier = %config.atr_multiplier,
            risk_per_trade = %config.risk_per_trade,
            "Strategy initialised"
        );
        Ok(Self { config, ledger, oracle })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn state(&self) -> SignalState {
        if self.ledger.is_held(&self.config.symbol) {
            SignalState::Long
        } else {
            SignalState::Flat
        }
    }

    /// SMA over `window` closes, fetching `window + margin` bars.
    pub async fn calculate_sma(&self, window: usize) -> Result<Option<Decimal>> {
        let bars = self
            .oracle
            .history(&self.config.symbol, window + self.config.history_margin)
            .await?;
        if bars.is_empty() {
            warn!(symbol = %self.config.symbol, window, "No bars for SMA");
        }
        let value = indicators::sma(&bars, window);
        debug!(window, bars = bars.len(), sma = ?value, "Calculated SMA");
        Ok(value)
    }

    /// ATR over the configured period, fetching `period + margin` bars.
    pub async fn calculate_atr(&self) -> Result<Option<Decimal>> {
        let period = self.config.atr_period;
        let bars = self
            .oracle
            .history(&self.config.symbol, period + self.config.history_margin)
            .await?;
        if bars.is_empty() {
            warn!(symbol = %self.config.symbol, period, "No bars for ATR");
        }
        let value = indicators::atr(&bars, period);
        debug!(period, bars = bars.len(), atr = ?value, "Calculated ATR");
        Ok(value)
    }

    /// Shares to buy for a stop `stop_distance` away, from current cash and
    /// the latest price. Zero if the price can't be fetched.
    pub async fn position_sizing(&self, stop_distance: Decimal) -> u64 {
        match self.oracle.last_price(&self.config.symbol).await {
            Ok(Some(quote)) => self.size_at(stop_distance, quote.price),
            Ok(None) => 0,
            Err(e) => {
                warn!(symbol = %self.config.symbol, error = %e, "Price lookup failed while sizing");
                0
            }
        }
    }

    /// Shares to buy at `price` with current cash.
    fn size_at(&self, stop_distance: Decimal, price: Decimal) -> u64 {
        sizing::position_size(self.ledger.cash(), self.config.risk_per_trade, stop_distance, price)
    }

    /// Gather indicators and decide buy / sell / hold for this cycle.
    pub async fn on_trading_iteration(&self) -> Result<IterationOutcome> {
        let symbol = self.config.symbol.as_str();

        let (short_sma, long_sma, atr, quote) = futures::try_join!(
            self.calculate_sma(self.config.short_window),
            self.calculate_sma(self.config.long_window),
            self.calculate_atr(),
            self.oracle.last_price(symbol),
        )?;

        let readings = match (short_sma, long_sma, atr, quote) {
            (None, ..) => return Ok(self.skip(SkipReason::ShortSma)),
            (_, None, ..) => return Ok(self.skip(SkipReason::LongSma)),
            (_, _, None, _) => return Ok(self.skip(SkipReason::Atr)),
            (_, _, _, None) => return Ok(self.skip(SkipReason::LastPrice)),
            (_, _, _, Some(q)) if q.price <= Decimal::ZERO => {
                return Ok(self.skip(SkipReason::LastPrice))
            }
            (Some(short_sma), Some(long_sma), Some(atr), Some(last_price)) => Readings {
                short_sma,
                long_sma,
                atr,
                last_price,
                stop_distance: atr.saturating_mul(self.config.atr_multiplier),
            },
        };

        let held = self.ledger.position(symbol);

        debug!(
            short_sma = %readings.short_sma,
            long_sma = %readings.long_sma,
            atr = %readings.atr,
            last_price = %readings.last_price.price,
            stop_distance = %readings.stop_distance,
            held,
            "Indicators"
        );

        let price = readings.last_price.price;

        if readings.short_sma > readings.long_sma && held == 0 {
            // Sized at the quote the order is placed at.
            let quantity = self.size_at(readings.stop_distance, price);
            if quantity == 0 {
                info!(symbol, stop_distance = %readings.stop_distance, "Golden cross but position sized to zero");
                return Ok(IterationOutcome::SizedToZero(readings));
            }
            let bracket = sizing::bracket(
                Side::Buy,
                price,
                readings.atr,
                readings.stop_distance,
                self.config.take_profit_atr,
            );
            let Some(execution) = self.ledger.place_entry_if_flat(symbol, quantity, price, Some(bracket))? else {
                info!(symbol, "Position opened elsewhere, no entry");
                return Ok(IterationOutcome::NoSignal(readings));
            };
            info!(symbol, quantity, price = %price, filled = execution.is_filled(), "Golden cross: BUY placed");
            return Ok(IterationOutcome::Entered { readings, execution });
        }

        if readings.short_sma < readings.long_sma && held > 0 {
            let bracket = sizing::bracket(
                Side::Sell,
                price,
                readings.atr,
                readings.stop_distance,
                self.config.take_profit_atr,
            );
            let execution = self.ledger.place_order(symbol, held, Side::Sell, price, Some(bracket))?;
            info!(symbol, quantity = held, price = %price, filled = execution.is_filled(), "Death cross: SELL placed");
            return Ok(IterationOutcome::Exited { readings, execution });
        }

        info!(symbol, state = %self.state(), "No trading signal");
        Ok(IterationOutcome::NoSignal(readings))
    }

    fn skip(&self, reason: SkipReason) -> IterationOutcome {
        warn!(symbol = %self.config.symbol, %reason, "Insufficient data, skipping cycle");
        IterationOutcome::Skipped(reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

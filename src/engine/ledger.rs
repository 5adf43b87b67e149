//! Paper-trading ledger.
//!
//! Holds cash and long positions, executes orders immediately at the
//! requested price, and keeps append-only order, trade and snapshot
//! histories. Every operation runs under one mutex, and check-then-mutate
//! sequences (balance check then deduction) never release it in between.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::data::PriceOracle;
use crate::types::{
    Bracket, Execution, Order, PortfolioSnapshot, Positions, RejectReason, Side, Trade,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Caller errors. Rejections for lack of cash or shares are not errors;
/// they come back as `Execution::Rejected`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid order side: {0:?}")]
    InvalidSide(String),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LedgerState {
    cash: Decimal,
    positions: Positions,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    snapshots: Vec<PortfolioSnapshot>,
}

/// Consistent copy of the whole ledger, taken under a single lock.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub initial_cash: Decimal,
    pub cash: Decimal,
    pub positions: Positions,
    pub orders: Vec<Order>,
    pub trades: Vec<Trade>,
    pub snapshots: Vec<PortfolioSnapshot>,
}

impl LedgerView {
    /// Cash plus this copy's positions marked at the oracle's last price.
    /// Cash and positions come from the same lock acquisition.
    pub async fn total_value(&self, oracle: &dyn PriceOracle) -> Decimal {
        value_holdings(self.cash, &self.positions, oracle).await
    }
}

/// One point of the portfolio-value curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuePoint {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub total_value: Decimal,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    initial_cash: Decimal,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new(initial_cash: Decimal) -> Self {
        let initial_cash = initial_cash.max(Decimal::ZERO);
        info!(cash = %initial_cash, "Ledger opened");
        Self {
            initial_cash,
            state: Mutex::new(LedgerState {
                cash: initial_cash,
                positions: Positions::new(),
                orders: Vec::new(),
                trades: Vec::new(),
                snapshots: Vec::new(),
            }),
        }
    }

    /// Every critical section leaves the state consistent before anything
    /// that could panic, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Writes ----------------------------------------------------------

    /// Record an order and execute it immediately.
    ///
    /// Malformed input (empty symbol, zero quantity, non-positive price, a
    /// notional beyond `Decimal` range) is logged and returned as an error
    /// with no state change. Otherwise the order lands in order history
    /// whatever the execution outcome.
    pub fn place_order(
        &self,
        symbol: &str,
        quantity: u64,
        side: Side,
        price: Decimal,
        bracket: Option<Bracket>,
    ) -> Result<Execution, LedgerError> {
        let order = prepare(symbol, quantity, side, price, bracket)?;
        let mut state = self.lock();
        Self::record_and_execute(&mut state, order)
    }

    /// BUY only if no position in `symbol` is open. The check and the fill
    /// happen under one lock, so concurrent callers can't both enter.
    /// `Ok(None)` when a position is already open; nothing is recorded.
    pub fn place_entry_if_flat(
        &self,
        symbol: &str,
        quantity: u64,
        price: Decimal,
        bracket: Option<Bracket>,
    ) -> Result<Option<Execution>, LedgerError> {
        let order = prepare(symbol, quantity, Side::Buy, price, bracket)?;
        let mut state = self.lock();
        if let Some(held) = state.positions.get(symbol) {
            warn!(symbol, held = *held, "Entry skipped, position already open");
            return Ok(None);
        }
        Self::record_and_execute(&mut state, order).map(Some)
    }

    /// Same as `place_order` with the side given as text (`"buy"`/`"sell"`).
    pub fn place_order_str(
        &self,
        symbol: &str,
        quantity: u64,
        side: &str,
        price: Decimal,
    ) -> Result<Execution, LedgerError> {
        let side = side.parse::<Side>().map_err(|e| {
            error!(symbol, side, "Invalid order side");
            e
        })?;
        self.place_order(symbol, quantity, side, price, None)
    }

    /// Execute an already-recorded order against current cash and positions.
    /// Does not touch order history.
    pub fn execute_order(&self, order: &Order) -> Result<Execution, LedgerError> {
        validate(&order.symbol, order.quantity, order.price).map_err(|e| {
            error!(order_id = %order.id, error = %e, "Order rejected as malformed");
            e
        })?;
        let mut state = self.lock();
        Self::execute_locked(&mut state, order)
    }

    fn record_and_execute(state: &mut LedgerState, order: Order) -> Result<Execution, LedgerError> {
        let execution = Self::execute_locked(state, &order)?;
        state.orders.push(order);
        Ok(execution)
    }

    /// Nothing is mutated unless every checked step succeeds.
    fn execute_locked(state: &mut LedgerState, order: &Order) -> Result<Execution, LedgerError> {
        let notional = order.notional().ok_or_else(|| overflow(order, "notional"))?;
        match order.side {
            Side::Buy => {
                if state.cash < notional {
                    let reason = RejectReason::InsufficientCash {
                        required: notional,
                        available: state.cash,
                    };
                    warn!(order_id = %order.id, %reason, "BUY not executed");
                    return Ok(Execution::Rejected(reason));
                }
                let held = state.positions.get(&order.symbol).copied().unwrap_or(0);
                let new_held = held
                    .checked_add(order.quantity)
                    .ok_or_else(|| overflow(order, "position"))?;
                state.cash -= notional;
                state.positions.insert(order.symbol.clone(), new_held);
            }
            Side::Sell => {
                let held = state.positions.get(&order.symbol).copied().unwrap_or(0);
                if held < order.quantity {
                    let reason = RejectReason::InsufficientShares {
                        requested: order.quantity,
                        held,
                    };
                    warn!(order_id = %order.id, %reason, "SELL not executed");
                    return Ok(Execution::Rejected(reason));
                }
                let new_cash = state
                    .cash
                    .checked_add(notional)
                    .ok_or_else(|| overflow(order, "cash"))?;
                state.cash = new_cash;
                let remaining = held - order.quantity;
                if remaining == 0 {
                    state.positions.remove(&order.symbol);
                } else {
                    state.positions.insert(order.symbol.clone(), remaining);
                }
            }
        }

        let trade = Trade::fill(order);
        state.trades.push(trade.clone());
        state.snapshots.push(PortfolioSnapshot {
            cash: state.cash,
            positions: state.positions.clone(),
            timestamp: trade.timestamp,
        });

        info!(
            side = %trade.side,
            quantity = trade.quantity,
            symbol = %trade.symbol,
            price = %trade.price,
            cash = %state.cash,
            "Executed"
        );

        Ok(Execution::Filled(trade))
    }

    // -- Reads -----------------------------------------------------------

    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    pub fn cash(&self) -> Decimal {
        self.lock().cash
    }

    pub fn positions(&self) -> Positions {
        self.lock().positions.clone()
    }

    /// Quantity held of `symbol` (0 when flat).
    pub fn position(&self, symbol: &str) -> u64 {
        self.lock().positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn is_held(&self, symbol: &str) -> bool {
        self.lock().positions.contains_key(symbol)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.lock().trades.clone()
    }

    pub fn snapshots(&self) -> Vec<PortfolioSnapshot> {
        self.lock().snapshots.clone()
    }

    pub fn view(&self) -> LedgerView {
        let state = self.lock();
        LedgerView {
            initial_cash: self.initial_cash,
            cash: state.cash,
            positions: state.positions.clone(),
            orders: state.orders.clone(),
            trades: state.trades.clone(),
            snapshots: state.snapshots.clone(),
        }
    }

    // -- Valuation -------------------------------------------------------

    /// Cash plus every position marked at the oracle's last price.
    /// A position whose price can't be fetched contributes zero.
    pub async fn get_portfolio_value(&self, oracle: &dyn PriceOracle) -> Decimal {
        let (cash, positions) = {
            let state = self.lock();
            (state.cash, state.positions.clone())
        };

        value_holdings(cash, &positions, oracle).await
    }

    /// Every snapshot valued at today's prices, oldest first.
    pub async fn portfolio_value_history(&self, oracle: &dyn PriceOracle) -> Vec<ValuePoint> {
        let snapshots = self.snapshots();
        let mut symbols: Vec<&String> = snapshots.iter().flat_map(|s| s.positions.keys()).collect();
        symbols.sort();
        symbols.dedup();

        let prices = price_all(oracle, symbols.into_iter()).await;
        snapshots
            .iter()
            .map(|s| ValuePoint {
                timestamp: s.timestamp,
                cash: s.cash,
                total_value: s.cash.saturating_add(mark(&s.positions, &prices)),
            })
            .collect()
    }

    /// Log cash, positions and total value.
    pub async fn report(&self, oracle: &dyn PriceOracle) -> Decimal {
        let total = self.get_portfolio_value(oracle).await;
        let state = self.lock();
        info!(
            cash = %state.cash,
            positions = ?state.positions,
            trades = state.trades.len(),
            total_value = %total,
            "Portfolio"
        );
        total
    }
}

fn validate(symbol: &str, quantity: u64, price: Decimal) -> Result<(), LedgerError> {
    if symbol.trim().is_empty() {
        return Err(LedgerError::InvalidOrder("empty symbol".into()));
    }
    if quantity == 0 {
        return Err(LedgerError::InvalidOrder("quantity must be positive".into()));
    }
    if price <= Decimal::ZERO {
        return Err(LedgerError::InvalidOrder(format!("price must be positive, got {price}")));
    }
    if Decimal::from(quantity).checked_mul(price).is_none() {
        return Err(LedgerError::InvalidOrder(format!("notional of {quantity} @ {price} overflows")));
    }
    Ok(())
}

/// Validate and build an order, logging malformed input.
fn prepare(
    symbol: &str,
    quantity: u64,
    side: Side,
    price: Decimal,
    bracket: Option<Bracket>,
) -> Result<Order, LedgerError> {
    if let Err(e) = validate(symbol, quantity, price) {
        error!(symbol, quantity, %price, error = %e, "Order rejected as malformed");
        return Err(e);
    }

    let order = Order::new(symbol, quantity, side, price).with_bracket(bracket);
    info!(
        order_id = %order.id,
        side = %side,
        quantity,
        symbol,
        price = %price,
        "Placed order"
    );
    Ok(order)
}

fn overflow(order: &Order, what: &str) -> LedgerError {
    let e = LedgerError::InvalidOrder(format!("{what} overflows executing {order}"));
    error!(order_id = %order.id, error = %e, "Order rejected as malformed");
    e
}

async fn price_all<'a>(
    oracle: &dyn PriceOracle,
    symbols: impl Iterator<Item = &'a String>,
) -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();
    for symbol in symbols {
        match oracle.last_price(symbol).await {
            Ok(Some(q)) => {
                prices.insert(symbol.clone(), q.price);
            }
            Ok(None) => debug!(symbol = %symbol, "No price, valuing position at zero"),
            Err(e) => warn!(symbol = %symbol, error = %e, "Price lookup failed, valuing position at zero"),
        }
    }
    prices
}

async fn value_holdings(cash: Decimal, positions: &Positions, oracle: &dyn PriceOracle) -> Decimal {
    let prices = price_all(oracle, positions.keys()).await;
    cash.saturating_add(mark(positions, &prices))
}

/// Saturates instead of overflowing on absurd prices.
fn mark(positions: &Positions, prices: &HashMap<String, Decimal>) -> Decimal {
    positions
        .iter()
        .filter_map(|(sym, qty)| prices.get(sym).map(|p| Decimal::from(*qty).saturating_mul(*p)))
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

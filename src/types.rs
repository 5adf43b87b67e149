//! Shared types for the paper-trading engine.
//!
//! These types form the data model used across the ledger, the strategy
//! and the reporting layer. Money and prices are `Decimal` so that ledger
//! arithmetic is exact.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::engine::ledger::LedgerError;

/// Symbol → quantity held. Entries with zero quantity are never stored.
pub type Positions = BTreeMap<String, u64>;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Latest traded price for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self { timestamp, open, high, low, close }
    }

    /// A bar where open, high, low and close are all `price`.
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self::new(timestamp, price, price, price, price)
    }

    /// High minus low.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O={} H={} L={} C={}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Order direction. Only long positions exist, so a sell always reduces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Case-insensitive parse of `"buy"` / `"sell"`.
impl std::str::FromStr for Side {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(LedgerError::InvalidSide(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders & trades
// ---------------------------------------------------------------------------

/// Informational take-profit / stop-loss levels attached to an order.
/// The paper ledger records them but never triggers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
}

/// An order as submitted to the ledger. Recorded whether or not it fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub symbol: String,
    pub quantity: u64,
    pub side: Side,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub bracket: Option<Bracket>,
}

impl Order {
    pub fn new(symbol: &str, quantity: u64, side: Side, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            quantity,
            side,
            price,
            timestamp: Utc::now(),
            bracket: None,
        }
    }

    pub fn with_bracket(mut self, bracket: Option<Bracket>) -> Self {
        self.bracket = bracket;
        self
    }

    /// Quantity × price, `None` if it overflows.
    pub fn notional(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.price)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} [{}]",
            self.side, self.quantity, self.symbol, self.price, self.id,
        )
    }
}

/// An executed fill. Always at the order's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: Uuid,
    pub symbol: String,
    pub quantity: u64,
    pub side: Side,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn fill(order: &Order) -> Self {
        Self {
            order_id: order.id,
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            side: order.side,
            price: order.price,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} ({})",
            self.side,
            self.quantity,
            self.symbol,
            self.price,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Cash and positions right after a fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub positions: Positions,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Execution outcome
// ---------------------------------------------------------------------------

/// Why the ledger declined to fill an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    InsufficientCash { required: Decimal, available: Decimal },
    InsufficientShares { requested: u64, held: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientCash { required, available } => {
                write!(f, "insufficient cash: need {required}, have {available}")
            }
            RejectReason::InsufficientShares { requested, held } => {
                write!(f, "insufficient shares: need {requested}, hold {held}")
            }
        }
    }
}

/// Result of running an order against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Filled(Trade),
    Rejected(RejectReason),
}

impl Execution {
    pub fn is_filled(&self) -> bool {
        matches!(self, Execution::Filled(_))
    }

    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Execution::Filled(t) => Some(t),
            Execution::Rejected(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

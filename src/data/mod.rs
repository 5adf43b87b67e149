//! Market data providers.
//!
//! Defines the `PriceOracle` trait and provides two implementations:
//! - `MemoryOracle` — in-memory bars and quotes (offline runs, tests)
//! - `YahooOracle` — Yahoo Finance chart endpoint over HTTP

pub mod memory;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Bar, Quote};

/// Read-only query interface over a market-data source.
///
/// Empty results (market closed, unknown symbol) are `Ok(None)` or an empty
/// vector, never errors. Callers treat both absent data and `Err` as
/// "skip this cycle".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Provider name for logs and status output.
    fn name(&self) -> &'static str;

    /// Latest traded price and its timestamp.
    async fn last_price(&self, symbol: &str) -> Result<Option<Quote>>;

    /// Up to `bars` daily OHLC bars, oldest first, most recent last.
    async fn history(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>>;
}

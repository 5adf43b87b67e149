//! Scripted market for integration testing.
//!
//! Wraps a `MemoryOracle` whose bar series and quotes are set from test
//! code, with an optional forced error so failure paths can be exercised
//! without a network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

use papertrade::data::memory::{quote_now, MemoryOracle};
use papertrade::data::PriceOracle;
use papertrade::types::{Bar, Quote};

pub const SYMBOL: &str = "SPY";

pub struct ScriptedMarket {
    inner: MemoryOracle,
    /// If set, every query returns this error.
    force_error: Mutex<Option<String>>,
}

impl ScriptedMarket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryOracle::new(),
            force_error: Mutex::new(None),
        })
    }

    /// Replace the daily series with `older` bars closing at `older_close`
    /// followed by `recent` bars closing at `recent_close`. Every bar has a
    /// high-low range of 2, so ATR over the recent run is 2.
    pub fn set_regime(&self, older: usize, older_close: Decimal, recent: usize, recent_close: Decimal) {
        let total = older + recent;
        let t0 = Utc::now() - Duration::days(total as i64);
        let bars = (0..total)
            .map(|i| {
                let close = if i < older { older_close } else { recent_close };
                Bar::new(t0 + Duration::days(i as i64), close, close + dec!(1), close - dec!(1), close)
            })
            .collect();
        self.inner.set_bars(SYMBOL, bars);
    }

    /// Pin the last traded price independently of the bars.
    pub fn set_price(&self, price: Decimal) {
        self.inner.set_price(SYMBOL, quote_now(price));
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    fn check(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PriceOracle for ScriptedMarket {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<Quote>> {
        self.check()?;
        self.inner.last_price(symbol).await
    }

    async fn history(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>> {
        self.check()?;
        self.inner.history(symbol, bars).await
    }
}

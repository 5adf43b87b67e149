//! In-memory price oracle.
//!
//! Holds bar series and explicit quotes per symbol. Series can be replaced
//! at runtime, which is how tests and offline demos move the
//! market. When no explicit quote is set the last bar's close is used.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::PriceOracle;
use crate::types::{Bar, Quote};

#[derive(Debug, Default)]
pub struct MemoryOracle {
    bars: RwLock<HashMap<String, Vec<Bar>>>,
    quotes: RwLock<HashMap<String, Quote>>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load bar series from a JSON fixture of the form
    /// `{ "SPY": [ { "timestamp": ..., "open": ..., ... }, ... ] }`.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read price fixture: {path}"))?;
        let series: HashMap<String, Vec<Bar>> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse price fixture: {path}"))?;

        info!(
            path,
            symbols = series.len(),
            bars = series.values().map(Vec::len).sum::<usize>(),
            "Loaded price fixture"
        );

        Ok(Self {
            bars: RwLock::new(series),
            quotes: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the bar series for `symbol`.
    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.bars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string(), bars);
    }

    /// Pin the last price for `symbol`, overriding the last close.
    pub fn set_price(&self, symbol: &str, quote: Quote) {
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string(), quote);
    }

    fn last_close(&self, symbol: &str) -> Option<Quote> {
        let bars = self.bars.read().unwrap_or_else(PoisonError::into_inner);
        bars.get(symbol)
            .and_then(|series| series.last())
            .map(|bar| Quote { price: bar.close, timestamp: bar.timestamp })
    }
}

#[async_trait]
impl PriceOracle for MemoryOracle {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<Quote>> {
        let pinned = self
            .quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied();

        let quote = pinned.or_else(|| self.last_close(symbol));
        if quote.is_none() {
            debug!(symbol, "No price available");
        }
        Ok(quote)
    }

    async fn history(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>> {
        let series = self.bars.read().unwrap_or_else(PoisonError::into_inner);
        let out = match series.get(symbol) {
            Some(all) => {
                let start = all.len().saturating_sub(bars);
                all[start..].to_vec()
            }
            None => Vec::new(),
        };
        Ok(out)
    }
}

/// Convenience: a quote at `price` stamped now.
pub fn quote_now(price: Decimal) -> Quote {
    Quote { price, timestamp: chrono::Utc::now() }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn series(closes: &[Decimal]) -> Vec<Bar> {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::flat(start + Duration::days(i as i64), *c))
            .collect()
    }

    #[tokio::test]
    async fn test_history_returns_most_recent_last() {
        let oracle = MemoryOracle::new();
        oracle.set_bars("SPY", series(&[dec!(1), dec!(2), dec!(3), dec!(4)]));

        let bars = oracle.history("SPY", 2).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(3));
        assert_eq!(bars[1].close, dec!(4));
    }

    #[tokio::test]
    async fn test_history_shorter_than_requested() {
        let oracle = MemoryOracle::new();
        oracle.set_bars("SPY", series(&[dec!(1), dec!(2)]));
        assert_eq!(oracle.history("SPY", 50).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_empty_not_error() {
        let oracle = MemoryOracle::new();
        assert!(oracle.history("NOPE", 10).await.unwrap().is_empty());
        assert!(oracle.last_price("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_price_falls_back_to_last_close() {
        let oracle = MemoryOracle::new();
        oracle.set_bars("SPY", series(&[dec!(10), dec!(11)]));
        let quote = oracle.last_price("SPY").await.unwrap().unwrap();
        assert_eq!(quote.price, dec!(11));
    }

    #[tokio::test]
    async fn test_pinned_price_overrides_close() {
        let oracle = MemoryOracle::new();
        oracle.set_bars("SPY", series(&[dec!(10)]));
        oracle.set_price("SPY", quote_now(dec!(12.5)));
        assert_eq!(oracle.last_price("SPY").await.unwrap().unwrap().price, dec!(12.5));
        assert_eq!(oracle.history("SPY", 5).await.unwrap()[0].close, dec!(10));
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("papertrade_fixture_{}.json", uuid::Uuid::new_v4()));
        let json = r#"{
            "SPY": [
                {"timestamp": "2024-01-02T00:00:00Z", "open": 470.0, "high": 472.5, "low": 468.0, "close": 471.0},
                {"timestamp": "2024-01-03T00:00:00Z", "open": 471.0, "high": 473.0, "low": 469.5, "close": 472.0}
            ]
        }"#;
        std::fs::write(&path, json).unwrap();

        let oracle = MemoryOracle::from_json_file(path.to_str().unwrap()).unwrap();
        let bars = oracle.history("SPY", 10).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, dec!(472));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_json_file_missing() {
        assert!(MemoryOracle::from_json_file("/tmp/papertrade_missing_fixture.json").is_err());
    }
}

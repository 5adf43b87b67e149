//! Yahoo Finance price oracle.
//!
//! Uses the public chart endpoint, which needs no authentication:
//! `GET {base}/v8/finance/chart/{symbol}?interval=..&range=..`
//! (or `period1`/`period2` unix seconds instead of `range`).
//!
//! Unknown symbols come back as HTTP 404 with `chart.result = null`; both
//! are mapped to "no data" rather than an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use super::PriceOracle;
use crate::types::{Bar, Quote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Decimal places kept when converting Yahoo's f64 prices.
const PRICE_DP: u32 = 4;

// ---------------------------------------------------------------------------
// API response types (Yahoo JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

/// Column-oriented OHLC arrays; entries are null for missing prints.
#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct YahooOracle {
    http: Client,
    base_url: String,
}

impl YahooOracle {
    pub fn new(base_url: Option<String>, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("papertrade/0.1.0")
            .build()
            .context("Failed to build HTTP client for Yahoo Finance")?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Fetch and flatten one chart series. `Ok(None)` when Yahoo has no data.
    async fn fetch_bars(&self, symbol: &str, query: &[(&str, String)]) -> Result<Option<Vec<Bar>>> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(symbol),
        );

        debug!(url = %url, ?query, "Fetching Yahoo chart");

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .context("Yahoo chart request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            warn!(symbol, "Yahoo has no data for symbol");
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo chart error {status}: {body}");
        }

        let envelope: ChartEnvelope = resp
            .json()
            .await
            .context("Failed to parse Yahoo chart response")?;

        Ok(parse_chart(envelope))
    }
}

/// Turn a chart envelope into bars, dropping rows with any missing field.
fn parse_chart(envelope: ChartEnvelope) -> Option<Vec<Bar>> {
    let result = envelope.chart.result?.into_iter().next()?;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let bars: Vec<Bar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let field = |col: &Vec<Option<f64>>| {
                col.get(i)
                    .copied()
                    .flatten()
                    .and_then(Decimal::from_f64)
                    .map(|d| d.round_dp(PRICE_DP))
            };
            Some(Bar {
                timestamp: secs_to_datetime(*ts)?,
                open: field(&quote.open)?,
                high: field(&quote.high)?,
                low: field(&quote.low)?,
                close: field(&quote.close)?,
            })
        })
        .collect();

    if bars.is_empty() {
        None
    } else {
        Some(bars)
    }
}

fn secs_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Calendar days needed to cover `bars` trading days, with slack for
/// weekends and exchange holidays.
fn calendar_days_for(bars: usize) -> i64 {
    (bars as i64 * 3) / 2 + 10
}

#[async_trait]
impl PriceOracle for YahooOracle {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<Quote>> {
        let query = [("interval", "1m".to_string()), ("range", "1d".to_string())];
        let bars = self.fetch_bars(symbol, &query).await?;
        Ok(bars
            .and_then(|b| b.last().copied())
            .map(|bar| Quote { price: bar.close, timestamp: bar.timestamp }))
    }

    async fn history(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>> {
        if bars == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let from = now - Duration::days(calendar_days_for(bars));
        let query = [
            ("interval", "1d".to_string()),
            ("period1", from.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
        ];

        let mut series = self.fetch_bars(symbol, &query).await?.unwrap_or_default();
        let start = series.len().saturating_sub(bars);
        series.drain(..start);
        Ok(series)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Configuration loading from TOML.
//!
//! Reads `config.toml` (or the path in `PAPERTRADE_CONFIG`) and
//! deserializes into strongly-typed structs. Every section has defaults, so
//! a partial file is enough.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::strategy::StrategyConfig;

/// Env var overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "PAPERTRADE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub trader: TraderConfig,
    pub strategy: StrategySection,
    pub oracle: OracleConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TraderConfig {
    pub initial_cash: f64,
    pub interval_secs: u64,
    /// Start the scheduler immediately rather than waiting for `POST /api/start`.
    pub autostart: bool,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            interval_secs: 60,
            autostart: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategySection {
    pub symbol: String,
    pub risk_per_trade: f64,
    pub short_window: usize,
    pub long_window: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub history_margin: usize,
    pub take_profit_atr: f64,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            symbol: "SPY".into(),
            risk_per_trade: 0.01,
            short_window: 50,
            long_window: 200,
            atr_period: 14,
            atr_multiplier: 1.5,
            history_margin: 10,
            take_profit_atr: 3.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleConfig {
    /// `"yahoo"` or `"memory"`.
    pub provider: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// JSON bars for the memory provider: `{ "SPY": [ {bar}, ... ] }`.
    pub fixture_path: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "yahoo".into(),
            base_url: None,
            timeout_secs: 15,
            fixture_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: true, port: 8080 }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Config path from `PAPERTRADE_CONFIG`, else `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn initial_cash(&self) -> Result<Decimal> {
        to_decimal(self.trader.initial_cash, "trader.initial_cash")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.trader.interval_secs.max(1))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    /// Strategy parameters with money fields converted to `Decimal`.
    pub fn strategy_config(&self) -> Result<StrategyConfig> {
        let s = &self.strategy;
        Ok(StrategyConfig {
            symbol: s.symbol.clone(),
            risk_per_trade: to_decimal(s.risk_per_trade, "strategy.risk_per_trade")?,
            short_window: s.short_window,
            long_window: s.long_window,
            atr_period: s.atr_period,
            atr_multiplier: to_decimal(s.atr_multiplier, "strategy.atr_multiplier")?,
            history_margin: s.history_margin,
            take_profit_atr: to_decimal(s.take_profit_atr, "strategy.take_profit_atr")?,
        })
    }
}

/// Via the shortest round-trip string, so `0.01` stays exactly `0.01`.
fn to_decimal(value: f64, field: &str) -> Result<Decimal> {
    Decimal::from_str(&value.to_string())
        .map(|d| d.normalize())
        .with_context(|| format!("{field} is not a representable number: {value}"))
}

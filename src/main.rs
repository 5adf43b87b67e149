//! papertrade — paper-trading loop with an SMA crossover strategy.
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the oracle, ledger, strategy and scheduler together, optionally serves
//! the dashboard, and runs until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use papertrade::config::AppConfig;
use papertrade::dashboard::{self, DashboardState};
use papertrade::data::memory::MemoryOracle;
use papertrade::data::yahoo::YahooOracle;
use papertrade::data::PriceOracle;
use papertrade::engine::ledger::Ledger;
use papertrade::engine::scheduler::Scheduler;
use papertrade::strategy::CrossoverTrader;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::path_from_env();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        symbol = %cfg.strategy.symbol,
        initial_cash = cfg.trader.initial_cash,
        interval_secs = cfg.trader.interval_secs,
        provider = %cfg.oracle.provider,
        "papertrade starting up"
    );

    // -- Components ------------------------------------------------------

    let oracle = build_oracle(&cfg)?;
    info!(oracle = oracle.name(), "Price oracle ready");
    let ledger = Arc::new(Ledger::new(cfg.initial_cash()?));

    let trader = CrossoverTrader::new(cfg.strategy_config()?, Arc::clone(&ledger), Arc::clone(&oracle))
        .context("Invalid [strategy] section")?;
    let trader = Arc::new(trader);

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&trader),
        Arc::clone(&ledger),
        Arc::clone(&oracle),
        cfg.interval(),
    ));

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle),
            Arc::clone(&trader),
            Arc::clone(&scheduler),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received.");
    };

    if cfg.trader.autostart {
        info!("Entering main loop. Press Ctrl+C to stop.");
        scheduler.run_until(shutdown).await;
    } else {
        info!("Autostart disabled; waiting for POST /api/start. Press Ctrl+C to exit.");
        shutdown.await;
        scheduler.stop().await;
    }

    let total = ledger.report(oracle.as_ref()).await;
    info!(
        iterations = scheduler.iterations(),
        trades = ledger.trades().len(),
        total_value = %total,
        pnl = %(total - ledger.initial_cash()),
        "papertrade shut down cleanly."
    );

    Ok(())
}

fn build_oracle(cfg: &AppConfig) -> Result<Arc<dyn PriceOracle>> {
    match cfg.oracle.provider.as_str() {
        "yahoo" => {
            info!(base_url = ?cfg.oracle.base_url, "Using Yahoo Finance price oracle");
            Ok(Arc::new(YahooOracle::new(cfg.oracle.base_url.clone(), cfg.oracle_timeout())?))
        }
        "memory" => match cfg.oracle.fixture_path.as_deref() {
            Some(path) => Ok(Arc::new(MemoryOracle::from_json_file(path)?)),
            None => {
                warn!("Memory oracle without fixture_path: every cycle will be skipped");
                Ok(Arc::new(MemoryOracle::new()))
            }
        },
        other => anyhow::bail!("Unknown oracle provider: {other} (expected \"yahoo\" or \"memory\")"),
    }
}

/// Initialise the tracing subscriber with env-filter and optional JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("papertrade=info"));

    let json_logging = std::env::var("PAPERTRADE_LOG_JSON").is_ok_and(|v| !v.is_empty());

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

//! Golden cross → hold → death cross, end to end over an in-memory market.

use rust_decimal_macros::dec;
use std::sync::Arc;

use papertrade::data::memory::MemoryOracle;
use papertrade::data::PriceOracle;
use papertrade::engine::ledger::Ledger;
use papertrade::strategy::{CrossoverTrader, IterationOutcome, SignalState, SkipReason, StrategyConfig};
use papertrade::types::Side;

use crate::market::{ScriptedMarket, SYMBOL};

fn setup(market: &Arc<ScriptedMarket>) -> (CrossoverTrader, Arc<Ledger>) {
    let ledger = Arc::new(Ledger::new(dec!(100000)));
    let oracle: Arc<dyn PriceOracle> = market.clone();
    let trader = CrossoverTrader::new(StrategyConfig::default(), Arc::clone(&ledger), oracle).unwrap();
    (trader, ledger)
}

#[tokio::test]
async fn test_full_crossover_cycle() {
    let market = ScriptedMarket::new();
    let (trader, ledger) = setup(&market);

    // SMA(50) = 112, SMA(200) = (150 × 96 + 50 × 112) / 200 = 100, ATR = 2.
    market.set_regime(150, dec!(96), 50, dec!(112));
    market.set_price(dec!(50));

    let outcome = trader.on_trading_iteration().await.unwrap();
    let IterationOutcome::Entered { readings, execution } = outcome else {
        panic!("expected golden-cross entry, got {outcome:?}");
    };
    assert_eq!(readings.short_sma, dec!(112));
    assert_eq!(readings.long_sma, dec!(100));
    assert_eq!(readings.atr, dec!(2));
    assert_eq!(execution.trade().unwrap().quantity, 6);
    assert_eq!(ledger.cash(), dec!(99700));
    assert_eq!(trader.state(), SignalState::Long);

    // Still above: hold, never pyramid.
    for _ in 0..3 {
        assert!(matches!(trader.on_trading_iteration().await.unwrap(), IterationOutcome::NoSignal(_)));
    }
    assert_eq!(ledger.position(SYMBOL), 6);

    // SMA(50) = 88, SMA(200) = (150 × 104 + 50 × 88) / 200 = 100.
    market.set_regime(150, dec!(104), 50, dec!(88));
    market.set_price(dec!(55));

    let outcome = trader.on_trading_iteration().await.unwrap();
    let IterationOutcome::Exited { execution, .. } = outcome else {
        panic!("expected death-cross exit, got {outcome:?}");
    };
    let trade = execution.trade().unwrap();
    assert_eq!(trade.side, Side::Sell);
    assert_eq!(trade.quantity, 6);
    assert_eq!(ledger.cash(), dec!(100030));
    assert!(ledger.positions().is_empty());
    assert_eq!(trader.state(), SignalState::Flat);

    // Below and flat: nothing to do.
    assert!(matches!(trader.on_trading_iteration().await.unwrap(), IterationOutcome::NoSignal(_)));

    let orders = ledger.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].bracket.unwrap().stop_loss, dec!(47));
    assert_eq!(orders[1].bracket.unwrap().stop_loss, dec!(58));

    let history = ledger.portfolio_value_history(market.as_ref()).await;
    assert_eq!(history.len(), 2);
    // After the buy: 99700 + 6 × 55 at today's price.
    assert_eq!(history[0].total_value, dec!(100030));
    assert_eq!(history[1].total_value, dec!(100030));
    assert_eq!(ledger.get_portfolio_value(market.as_ref()).await, dec!(100030));
}

#[tokio::test]
async fn test_oracle_failure_leaves_ledger_untouched() {
    let market = ScriptedMarket::new();
    let (trader, ledger) = setup(&market);
    market.set_regime(150, dec!(96), 50, dec!(112));
    market.set_price(dec!(50));

    market.set_error("connection reset");
    assert!(trader.on_trading_iteration().await.is_err());
    assert!(ledger.orders().is_empty());
    assert_eq!(ledger.cash(), dec!(100000));

    market.clear_error();
    assert!(matches!(trader.on_trading_iteration().await.unwrap(), IterationOutcome::Entered { .. }));
}

#[tokio::test]
async fn test_unknown_symbol_skips() {
    let market = ScriptedMarket::new();
    let (trader, ledger) = setup(&market);

    assert_eq!(
        trader.on_trading_iteration().await.unwrap(),
        IterationOutcome::Skipped(SkipReason::ShortSma)
    );
    assert!(ledger.orders().is_empty());
}

#[tokio::test]
async fn test_fixture_series_runs_clean() {
    let oracle: Arc<dyn PriceOracle> = Arc::new(MemoryOracle::from_json_file("fixtures/spy_daily.json").unwrap());
    let ledger = Arc::new(Ledger::new(dec!(100000)));
    let trader = CrossoverTrader::new(StrategyConfig::default(), Arc::clone(&ledger), Arc::clone(&oracle)).unwrap();

    let outcome = trader.on_trading_iteration().await.unwrap();
    assert!(!matches!(outcome, IterationOutcome::Skipped(_)), "got {outcome:?}");

    assert!(ledger.cash() >= dec!(0));
    let total = ledger.get_portfolio_value(oracle.as_ref()).await;
    assert!(total > dec!(0));
}

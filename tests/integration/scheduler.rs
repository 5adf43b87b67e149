//! Scheduler driving the strategy against an in-memory market.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use papertrade::data::PriceOracle;
use papertrade::engine::ledger::Ledger;
use papertrade::engine::scheduler::Scheduler;
use papertrade::strategy::{CrossoverTrader, StrategyConfig};

use crate::market::{ScriptedMarket, SYMBOL};

const TICK: Duration = Duration::from_millis(10);

fn build(market: &Arc<ScriptedMarket>) -> (Scheduler, Arc<Ledger>) {
    let oracle: Arc<dyn PriceOracle> = market.clone();
    let ledger = Arc::new(Ledger::new(dec!(100000)));
    let trader = Arc::new(
        CrossoverTrader::new(StrategyConfig::default(), Arc::clone(&ledger), Arc::clone(&oracle)).unwrap(),
    );
    (Scheduler::new(trader, Arc::clone(&ledger), oracle, TICK), ledger)
}

async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(TICK).await;
    }
    false
}

#[tokio::test]
async fn test_loop_enters_once_and_exits_on_death_cross() {
    let market = ScriptedMarket::new();
    market.set_regime(150, dec!(96), 50, dec!(112));
    market.set_price(dec!(50));
    let (sched, ledger) = build(&market);

    assert!(sched.start().await);
    assert!(wait_for(|| ledger.position(SYMBOL) == 6).await);

    // Several more ticks above the long average.
    let seen = sched.iterations();
    assert!(wait_for(|| sched.iterations() >= seen + 3).await);
    assert_eq!(ledger.orders().len(), 1);

    market.set_regime(150, dec!(104), 50, dec!(88));
    assert!(wait_for(|| !ledger.is_held(SYMBOL)).await);

    assert!(sched.stop().await);
    assert_eq!(ledger.trades().len(), 2);
    assert_eq!(ledger.cash(), dec!(100000));
}

#[tokio::test]
async fn test_loop_survives_oracle_outage() {
    let market = ScriptedMarket::new();
    market.set_regime(150, dec!(96), 50, dec!(112));
    market.set_price(dec!(50));
    market.set_error("503 Service Unavailable");
    let (sched, ledger) = build(&market);

    sched.start().await;
    assert!(wait_for(|| sched.iterations() >= 3).await);
    assert!(ledger.orders().is_empty());

    market.clear_error();
    assert!(wait_for(|| ledger.is_held(SYMBOL)).await);
    sched.stop().await;
    assert_eq!(ledger.orders().len(), 1);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_iteration() {
    let market = ScriptedMarket::new();
    market.set_regime(150, dec!(100), 50, dec!(100));
    let (sched, _) = build(&market);

    sched.start().await;
    assert!(wait_for(|| sched.iterations() >= 1).await);
    sched.stop().await;

    let after = sched.iterations();
    tokio::time::sleep(TICK * 5).await;
    assert_eq!(sched.iterations(), after);
    assert!(!sched.is_running());
}

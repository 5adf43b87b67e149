//! Interval loop driving the strategy.
//!
//! Each tick runs one trading iteration and then prints the portfolio
//! report. A failing or panicking iteration is logged and the loop carries
//! on. Stopping is cooperative: the signal is only observed between
//! iterations, so an in-flight iteration always runs to completion.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::data::PriceOracle;
use crate::engine::ledger::Ledger;
use crate::strategy::{CrossoverTrader, IterationOutcome};

struct Shared {
    trader: Arc<CrossoverTrader>,
    ledger: Arc<Ledger>,
    oracle: Arc<dyn PriceOracle>,
    interval: Duration,
    iterations: AtomicU64,
    running: AtomicBool,
    /// Held for a whole iteration, so `run_once` and the loop never overlap.
    iteration_lock: Mutex<()>,
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Scheduler {
    pub fn new(
        trader: Arc<CrossoverTrader>,
        ledger: Arc<Ledger>,
        oracle: Arc<dyn PriceOracle>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                trader,
                ledger,
                oracle,
                interval,
                iterations: AtomicU64::new(0),
                running: AtomicBool::new(false),
                iteration_lock: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Completed iterations since construction, across restarts.
    pub fn iterations(&self) -> u64 {
        self.shared.iterations.load(Ordering::SeqCst)
    }

    /// Spawn the loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            debug!("Scheduler already running");
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_loop(shared, stop_rx));
        *worker = Some(Worker { stop, handle });
        self.shared.running.store(true, Ordering::SeqCst);

        info!(
            symbol = %self.shared.trader.symbol(),
            interval_secs = self.shared.interval.as_secs_f64(),
            "Scheduler started"
        );
        true
    }

    /// Signal the loop and wait for it to exit. Returns `false` if it was
    /// not running.
    pub async fn stop(&self) -> bool {
        let mut worker = self.worker.lock().await;
        let Some(Worker { stop, handle }) = worker.take() else {
            debug!("Scheduler not running");
            return false;
        };

        // A send error means the loop already exited on its own.
        let _ = stop.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        self.shared.running.store(false, Ordering::SeqCst);

        info!(iterations = self.iterations(), "Scheduler stopped");
        true
    }

    /// Run the loop until `shutdown` resolves, then stop it.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        shutdown.await;
        self.stop().await;
    }

    /// Run one iteration in the caller's task. Waits for any iteration the
    /// loop has in flight.
    pub async fn run_once(&self) {
        self.shared.iterate().await;
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Err here means the Scheduler was dropped.
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        if *stop.borrow() {
            break;
        }
        shared.iterate().await;
    }

    debug!("Scheduler loop exited");
}

impl Shared {
    async fn iterate(&self) {
        let _guard = self.iteration_lock.lock().await;
        let n = self.iterations.load(Ordering::SeqCst) + 1;

        let result = AssertUnwindSafe(async {
            let outcome = self.trader.on_trading_iteration().await;
            self.ledger.report(self.oracle.as_ref()).await;
            outcome
        })
        .catch_unwind()
        .await;

        match result {
            Ok(Ok(outcome)) => log_outcome(n, &outcome),
            Ok(Err(e)) => error!(iteration = n, error = %e, "Iteration failed, continuing"),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(iteration = n, panic = %msg, "Iteration panicked, continuing");
            }
        }

        self.iterations.fetch_add(1, Ordering::SeqCst);
    }
}

fn log_outcome(n: u64, outcome: &IterationOutcome) {
    match outcome {
        IterationOutcome::Skipped(reason) => warn!(iteration = n, %reason, "Iteration skipped"),
        IterationOutcome::NoSignal(_) | IterationOutcome::SizedToZero(_) => {
            debug!(iteration = n, "Iteration complete, no order")
        }
        IterationOutcome::Entered { execution, .. } | IterationOutcome::Exited { execution, .. } => {
            info!(iteration = n, filled = execution.is_filled(), "Iteration complete, order placed")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

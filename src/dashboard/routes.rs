//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::data::PriceOracle;
use crate::engine::ledger::{Ledger, ValuePoint};
use crate::engine::scheduler::Scheduler;
use crate::strategy::{CrossoverTrader, SignalState};
use crate::types::{Order, Positions, Trade};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub ledger: Arc<Ledger>,
    pub oracle: Arc<dyn PriceOracle>,
    pub trader: Arc<CrossoverTrader>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(
        ledger: Arc<Ledger>,
        oracle: Arc<dyn PriceOracle>,
        trader: Arc<CrossoverTrader>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            ledger,
            oracle,
            trader,
            scheduler,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub iterations: u64,
    pub interval_secs: u64,
    pub symbol: String,
    pub oracle: &'static str,
    pub signal_state: SignalState,
    pub orders: usize,
    pub trades: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioResponse {
    pub initial_cash: Decimal,
    pub cash: Decimal,
    pub positions: Positions,
    pub total_value: Decimal,
    pub pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    /// Whether this request changed the scheduler's state.
    pub changed: bool,
    pub running: bool,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let view = state.ledger.view();
    Json(StatusResponse {
        running: state.scheduler.is_running(),
        iterations: state.scheduler.iterations(),
        interval_secs: state.scheduler.interval().as_secs(),
        symbol: state.trader.symbol().to_string(),
        oracle: state.oracle.name(),
        signal_state: state.trader.state(),
        orders: view.orders.len(),
        trades: view.trades.len(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/portfolio
pub async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioResponse> {
    let view = state.ledger.view();
    let total_value = view.total_value(state.oracle.as_ref()).await;
    Json(PortfolioResponse {
        initial_cash: view.initial_cash,
        cash: view.cash,
        pnl: total_value - view.initial_cash,
        positions: view.positions,
        total_value,
        timestamp: Utc::now(),
    })
}

/// GET /api/orders
pub async fn get_orders(State(state): State<AppState>) -> Json<Vec<Order>> {
    Json(state.ledger.orders())
}

/// GET /api/trades
pub async fn get_trades(State(state): State<AppState>) -> Json<Vec<Trade>> {
    Json(state.ledger.trades())
}

/// GET /api/portfolio-history
pub async fn get_portfolio_history(State(state): State<AppState>) -> Json<Vec<ValuePoint>> {
    Json(state.ledger.portfolio_value_history(state.oracle.as_ref()).await)
}

/// POST /api/start
pub async fn start_trading(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.scheduler.start().await;
    Json(ControlResponse { changed, running: state.scheduler.is_running() })
}

/// POST /api/stop
pub async fn stop_trading(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.scheduler.stop().await;
    Json(ControlResponse { changed, running: state.scheduler.is_running() })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

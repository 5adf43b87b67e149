//! Core engine — the paper ledger and the loop that drives the strategy.

pub mod ledger;
pub mod scheduler;

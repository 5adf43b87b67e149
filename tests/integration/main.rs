//! Integration tests: the full oracle → strategy → ledger pipeline,
//! driven directly and through the scheduler.

mod market;
mod scheduler;
mod trading_cycle;

// Backtester adapters
pub mod backtest;

// Durable storage
pub mod persistence;

// Strategy genome and identity
pub mod descriptor;

// Domain-specific error types
pub mod errors;

// Backtest metrics, fitness records, generation snapshots
pub mod metrics;

// Port interfaces for external collaborators
pub mod ports;

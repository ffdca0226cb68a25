// Fake evaluator for dry runs
pub mod mock;

// External backtester process
pub mod process;

// Output parsing
pub mod report;

// Checkpoint files and resume
pub mod checkpoint;

// Generational state machine
pub mod evolution_loop;

// Scalar fitness from backtest metrics
pub mod fitness;

// Random genome sampling
pub mod generator;

// Mutation, crossover, selection
pub mod genetic_ops;

// Population lifecycle and evolve step
pub mod population;

// Generation statistics and diversity
pub mod stats;

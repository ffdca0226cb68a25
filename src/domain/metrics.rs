//! Performance metrics and generation-level records.

use crate::domain::descriptor::{DescriptorId, StrategyDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw backtest metrics for one strategy, as reported by the backtesting
/// engine. Percentages are on a 0-100 scale, drawdown is signed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_profit_pct: f64,
    pub total_profit_abs: f64,
    pub trades_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub avg_duration: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
}

/// Fitness score together with the raw metrics it was derived from.
/// Owned by the population for the current generation only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    pub fitness: f64,
    pub metrics: BacktestMetrics,
}

/// Parent lineage per descriptor. Empty = random origin, one entry = elite
/// carry-over or mutated clone, two entries = crossover product.
pub type Genealogy = BTreeMap<DescriptorId, Vec<DescriptorId>>;

/// Full state of one generation, closed over at evolution time and
/// persisted as a checkpoint. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub generation: u32,
    pub size: usize,
    pub descriptors: Vec<StrategyDescriptor>,
    pub records: BTreeMap<DescriptorId, FitnessRecord>,
    pub genealogy: Genealogy,
    pub created_at: DateTime<Utc>,
}

/// Derived statistics for one evaluated generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStatistics {
    pub generation: u32,
    pub population_size: usize,
    pub evaluated: usize,
    pub dropped: usize,
    pub defaulted: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub std_fitness: f64,
    pub best_profit: f64,
    pub avg_profit: f64,
    pub diversity_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Row returned by the persistence collaborator's top-N query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: DescriptorId,
    pub generation: u32,
    pub fitness: f64,
    pub total_profit_pct: f64,
    pub trades_count: u32,
    pub win_rate: f64,
}

use crate::domain::descriptor::StrategyDescriptor;
use crate::domain::errors::EvaluationError;
use crate::domain::metrics::{
    BacktestMetrics, GenerationSnapshot, GenerationStatistics, LeaderboardEntry,
};
use anyhow::Result;
use async_trait::async_trait;

/// External backtesting engine. The core depends only on this contract,
/// never on invocation details (native process vs container).
#[async_trait]
pub trait StrategyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        descriptor: &StrategyDescriptor,
    ) -> Result<BacktestMetrics, EvaluationError>;
}

/// Durable storage for snapshots and generation statistics. Treated as
/// fire-and-forget by the evolution loop: failures are logged, never fatal.
#[async_trait]
pub trait EvolutionStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &GenerationSnapshot) -> Result<()>;
    async fn save_statistics(&self, stats: &GenerationStatistics) -> Result<()>;
    async fn top_strategies(&self, n: usize) -> Result<Vec<LeaderboardEntry>>;
    async fn generation_history(&self) -> Result<Vec<GenerationStatistics>>;
}

/// Produces fresh random genomes. Ids must be unique within a generation.
pub trait DescriptorGenerator: Send {
    fn generate(&mut self, generation: u32, ordinal: u32) -> Result<StrategyDescriptor>;
}

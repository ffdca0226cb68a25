use crate::domain::descriptor::IndicatorKind;
use thiserror::Error;

/// Violations of the genome invariants, raised at construction and after
/// every genetic operator application.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("indicator count {count} outside [2, 6]")]
    IndicatorCount { count: usize },

    #[error("duplicate indicator: {kind}")]
    DuplicateIndicator { kind: IndicatorKind },

    #[error("stop-loss {value} outside [-0.30, -0.01]")]
    StopLossOutOfRange { value: f64 },

    #[error("condition count {count} outside [1, 4]")]
    ConditionCount { count: u8 },

    #[error("malformed descriptor id: {raw}")]
    InvalidId { raw: String },
}

/// Generation-level failures. All variants are fatal for the evolution run.
#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("failed to build population of size {requested}: {reason}")]
    GenerationInit { requested: usize, reason: String },

    #[error("population of generation {generation} is empty, cannot evolve")]
    EmptyPopulation { generation: u32 },

    #[error(
        "generation {generation} collapsed to {remaining} strategies after filtering \
         (minimum viable: {minimum})"
    )]
    PopulationCollapse {
        generation: u32,
        remaining: usize,
        minimum: usize,
    },

    #[error("invalid evolution parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("checkpoint {path} could not be loaded: {reason}")]
    CheckpointLoad { path: String, reason: String },
}

/// Per-strategy evaluation failures. Recoverable: the strategy is dropped or
/// assigned default metrics, the generation always proceeds.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to launch backtest process: {reason}")]
    Spawn { reason: String },

    #[error("backtest process exited with status {status}: {stderr}")]
    ProcessFailed { status: i32, stderr: String },

    #[error("backtest timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("could not parse backtest output: {reason}")]
    UnparseableOutput { reason: String },

    // Degenerate but not necessarily broken: the strategy simply never traded.
    #[error("backtest produced zero trades")]
    ZeroTrades,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evolution_error_formatting() {
        let err = EvolutionError::PopulationCollapse {
            generation: 4,
            remaining: 1,
            minimum: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("generation 4"));
        assert!(msg.contains("minimum viable: 2"));
    }

    #[test]
    fn test_evaluation_error_formatting() {
        let err = EvaluationError::Timeout { seconds: 300 };
        assert!(err.to_string().contains("300"));
    }
}

use crate::domain::errors::EvolutionError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Weights for the six fitness components. Must sum to roughly 1.0;
/// a larger deviation is logged as a warning, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    pub profit: f64,
    pub sharpe: f64,
    pub drawdown: f64,
    pub winrate: f64,
    pub stability: f64,
    pub trade_count: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            profit: 0.30,
            sharpe: 0.10,
            drawdown: 0.25,
            winrate: 0.15,
            stability: 0.15,
            trade_count: 0.05,
        }
    }
}

impl FitnessWeights {
    pub fn sum(&self) -> f64 {
        self.profit + self.sharpe + self.drawdown + self.winrate + self.stability + self.trade_count
    }

    pub fn warn_if_unbalanced(&self) {
        let sum = self.sum();
        if (sum - 1.0).abs() > 0.05 {
            warn!("Fitness weights sum to {:.3}, expected close to 1.0", sum);
        }
    }

    pub fn from_toml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read weights file: {}", path))?;
        let weights: FitnessWeights =
            toml::from_str(&content).context(format!("Failed to parse weights TOML: {}", path))?;
        Ok(weights)
    }
}

/// Knobs consumed by `Population::evolve_generation`.
#[derive(Debug, Clone, Copy)]
pub struct EvolveParams {
    pub elite_size: usize,
    pub mutation_rate: f64,
    pub mutation_strength: f64,
    pub crossover_rate: f64,
    pub new_random_rate: f64,
    pub tournament_size: usize,
}

/// Full configuration for an evolution run. Defaults mirror the values the
/// search was tuned with; environment variables override defaults and the
/// CLI overrides both.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: u32,
    pub elite_size: usize,
    pub mutation_rate: f64,
    pub mutation_strength: f64,
    pub crossover_rate: f64,
    pub new_random_rate: f64,
    pub tournament_size: usize,
    pub checkpoint_interval: u32,
    pub checkpoint_dir: PathBuf,
    pub max_concurrent_evaluations: usize,
    pub evaluation_timeout_secs: u64,
    /// When true (default) strategies that fail evaluation are removed from
    /// the generation; when false they keep default zeroed metrics.
    pub ignore_invalid: bool,
    /// Fixed seed makes the evolve steps reproducible run-to-run.
    pub seed: Option<u64>,
    pub weights: FitnessWeights,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 100,
            elite_size: 4,
            mutation_rate: 0.20,
            mutation_strength: 0.15,
            crossover_rate: 0.70,
            new_random_rate: 0.10,
            tournament_size: 5,
            checkpoint_interval: 10,
            checkpoint_dir: PathBuf::from("checkpoints"),
            max_concurrent_evaluations: 4,
            evaluation_timeout_secs: 300,
            ignore_invalid: true,
            seed: None,
            weights: FitnessWeights::default(),
        }
    }
}

fn invalid(reason: String) -> Result<()> {
    Err(EvolutionError::InvalidParameters { reason }.into())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EvolutionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            population_size: env_parse("EVO_POPULATION_SIZE", defaults.population_size),
            generations: env_parse("EVO_GENERATIONS", defaults.generations),
            elite_size: env_parse("EVO_ELITE_SIZE", defaults.elite_size),
            mutation_rate: env_parse("EVO_MUTATION_RATE", defaults.mutation_rate),
            mutation_strength: env_parse("EVO_MUTATION_STRENGTH", defaults.mutation_strength),
            crossover_rate: env_parse("EVO_CROSSOVER_RATE", defaults.crossover_rate),
            new_random_rate: env_parse("EVO_NEW_RANDOM_RATE", defaults.new_random_rate),
            tournament_size: env_parse("EVO_TOURNAMENT_SIZE", defaults.tournament_size),
            checkpoint_interval: env_parse("EVO_CHECKPOINT_INTERVAL", defaults.checkpoint_interval),
            checkpoint_dir: env::var("EVO_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_dir),
            max_concurrent_evaluations: env_parse(
                "EVO_MAX_CONCURRENT_EVALUATIONS",
                defaults.max_concurrent_evaluations,
            ),
            evaluation_timeout_secs: env_parse(
                "EVO_EVALUATION_TIMEOUT_SECS",
                defaults.evaluation_timeout_secs,
            ),
            ignore_invalid: env_parse("EVO_IGNORE_INVALID", defaults.ignore_invalid),
            seed: env::var("EVO_SEED").ok().and_then(|v| v.parse().ok()),
            weights: defaults.weights,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return invalid(format!(
                "population size must be at least 2, got {}",
                self.population_size
            ));
        }
        if self.elite_size >= self.population_size {
            return invalid(format!(
                "elite size {} must be smaller than population size {}",
                self.elite_size, self.population_size
            ));
        }
        for (name, rate) in [
            ("mutation rate", self.mutation_rate),
            ("crossover rate", self.crossover_rate),
            ("new-random rate", self.new_random_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("{} must be in [0, 1], got {}", name, rate));
            }
        }
        if self.mutation_strength <= 0.0 {
            return invalid(format!(
                "mutation strength must be positive, got {}",
                self.mutation_strength
            ));
        }
        if self.tournament_size == 0 {
            return invalid("tournament size must be at least 1".to_string());
        }
        if self.generations == 0 {
            return invalid("generation count must be at least 1".to_string());
        }
        if self.max_concurrent_evaluations == 0 {
            return invalid("evaluation concurrency must be at least 1".to_string());
        }
        self.weights.warn_if_unbalanced();
        Ok(())
    }

    pub fn evolve_params(&self) -> EvolveParams {
        EvolveParams {
            elite_size: self.elite_size,
            mutation_rate: self.mutation_rate,
            mutation_strength: self.mutation_strength,
            crossover_rate: self.crossover_rate,
            new_random_rate: self.new_random_rate,
            tournament_size: self.tournament_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_elite_size_must_be_below_population() {
        let config = EvolutionConfig {
            population_size: 10,
            elite_size: 10,
            ..EvolutionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rates_must_be_probabilities() {
        let config = EvolutionConfig {
            mutation_rate: 1.5,
            ..EvolutionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_failure_carries_invalid_parameters() {
        let config = EvolutionConfig {
            population_size: 1,
            ..EvolutionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvolutionError>(),
            Some(EvolutionError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = FitnessWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_parse_from_toml() {
        let toml = r#"
            profit = 0.4
            sharpe = 0.1
            drawdown = 0.2
            winrate = 0.1
            stability = 0.15
            trade_count = 0.05
        "#;
        let weights: FitnessWeights = toml::from_str(toml).unwrap();
        assert_eq!(weights.profit, 0.4);
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }
}

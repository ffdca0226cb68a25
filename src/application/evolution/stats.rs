//! Aggregate statistics over an evaluated generation.

use crate::domain::metrics::{FitnessRecord, GenerationStatistics};
use chrono::Utc;

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator), 0.0 for fewer than two
/// observations.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_or(values: &[f64], default: f64) -> f64 {
    values
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(default)
}

fn min_or(values: &[f64], default: f64) -> f64 {
    values
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(default)
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m.abs()
}

/// Phenotype diversity of a generation in [0, 1]. The mean coefficient of
/// variation across fitness, profit, win rate and absolute drawdown,
/// rescaled so that a CV of 0.5 already counts as fully diverse.
pub fn diversity_score(records: &[&FitnessRecord]) -> f64 {
    if records.len() <= 1 {
        return 0.0;
    }

    let fitness: Vec<f64> = records.iter().map(|r| r.fitness).collect();
    let profit: Vec<f64> = records.iter().map(|r| r.metrics.total_profit_pct).collect();
    let winrate: Vec<f64> = records.iter().map(|r| r.metrics.win_rate).collect();
    let drawdown: Vec<f64> = records
        .iter()
        .map(|r| r.metrics.max_drawdown_pct.abs())
        .collect();

    let mean_cv = (coefficient_of_variation(&fitness)
        + coefficient_of_variation(&profit)
        + coefficient_of_variation(&winrate)
        + coefficient_of_variation(&drawdown))
        / 4.0;

    (mean_cv / 0.5).clamp(0.0, 1.0)
}

pub struct StatisticsInput<'a> {
    pub generation: u32,
    pub population_size: usize,
    pub evaluated: usize,
    pub dropped: usize,
    pub defaulted: usize,
    pub records: Vec<&'a FitnessRecord>,
}

pub fn generation_statistics(input: StatisticsInput<'_>) -> GenerationStatistics {
    let fitness: Vec<f64> = input.records.iter().map(|r| r.fitness).collect();
    let profit: Vec<f64> = input
        .records
        .iter()
        .map(|r| r.metrics.total_profit_pct)
        .collect();

    GenerationStatistics {
        generation: input.generation,
        population_size: input.population_size,
        evaluated: input.evaluated,
        dropped: input.dropped,
        defaulted: input.defaulted,
        best_fitness: max_or(&fitness, 0.0),
        avg_fitness: mean(&fitness),
        worst_fitness: min_or(&fitness, 0.0),
        std_fitness: std_dev(&fitness),
        best_profit: max_or(&profit, 0.0),
        avg_profit: mean(&profit),
        diversity_score: diversity_score(&input.records),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::BacktestMetrics;

    fn record(fitness: f64, profit: f64, winrate: f64, drawdown: f64) -> FitnessRecord {
        FitnessRecord {
            fitness,
            metrics: BacktestMetrics {
                total_profit_pct: profit,
                win_rate: winrate,
                max_drawdown_pct: drawdown,
                trades_count: 50,
                ..BacktestMetrics::default()
            },
        }
    }

    #[test]
    fn test_std_dev_sample_convention() {
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[1.0]), 0.0);
        // sample variance of {2, 4} is 2
        assert!((std_dev(&[2.0, 4.0]) - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_identical_population_has_zero_diversity() {
        let r = record(0.5, 10.0, 55.0, -15.0);
        let records = vec![&r, &r, &r];
        assert_eq!(diversity_score(&records), 0.0);
    }

    #[test]
    fn test_single_record_has_zero_diversity() {
        let r = record(0.5, 10.0, 55.0, -15.0);
        assert_eq!(diversity_score(&[&r]), 0.0);
    }

    #[test]
    fn test_spread_population_scores_high_diversity() {
        let a = record(0.05, -30.0, 20.0, -60.0);
        let b = record(0.9, 80.0, 75.0, -5.0);
        let c = record(0.4, 5.0, 50.0, -25.0);
        let score = diversity_score(&[&a, &b, &c]);
        assert!(score > 0.5, "expected high diversity, got {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_generation_statistics_aggregates() {
        let a = record(0.2, -5.0, 40.0, -20.0);
        let b = record(0.8, 30.0, 60.0, -10.0);
        let stats = generation_statistics(StatisticsInput {
            generation: 3,
            population_size: 4,
            evaluated: 2,
            dropped: 2,
            defaulted: 0,
            records: vec![&a, &b],
        });
        assert_eq!(stats.generation, 3);
        assert_eq!(stats.best_fitness, 0.8);
        assert_eq!(stats.worst_fitness, 0.2);
        assert!((stats.avg_fitness - 0.5).abs() < 1e-12);
        assert_eq!(stats.best_profit, 30.0);
        assert!((stats.avg_profit - 12.5).abs() < 1e-12);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn test_empty_records_produce_zeroed_statistics() {
        let stats = generation_statistics(StatisticsInput {
            generation: 0,
            population_size: 0,
            evaluated: 0,
            dropped: 0,
            defaulted: 0,
            records: vec![],
        });
        assert_eq!(stats.best_fitness, 0.0);
        assert_eq!(stats.avg_fitness, 0.0);
        assert_eq!(stats.diversity_score, 0.0);
    }
}

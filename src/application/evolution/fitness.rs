//! Scalar fitness from raw backtest metrics.
//!
//! Six components are normalized to [0, 1], combined by the configured
//! weights, then scaled down by penalty multipliers for clearly undesirable
//! regimes. The final score is clamped to [0, 1]. Multiple penalties
//! compound: a strategy that both loses money and barely trades is worse
//! than one with a single defect.

use crate::config::FitnessWeights;
use crate::domain::metrics::BacktestMetrics;

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Trade-count desirability. Too few trades is statistically meaningless,
/// far too many points at overtrading.
fn trade_count_score(trades: u32) -> f64 {
    match trades {
        0..=9 => 0.0,
        10..=29 => 0.3,
        30..=200 => 1.0,
        201..=500 => 0.8,
        _ => 0.5,
    }
}

pub struct FitnessCalculator {
    weights: FitnessWeights,
}

impl FitnessCalculator {
    pub fn new(weights: FitnessWeights) -> Self {
        weights.warn_if_unbalanced();
        Self { weights }
    }

    /// Scores one strategy. A backtest with zero trades scores 0.0 no matter
    /// what the other metrics claim.
    pub fn score(&self, metrics: &BacktestMetrics) -> f64 {
        if metrics.trades_count == 0 {
            return 0.0;
        }

        let drawdown = metrics.max_drawdown_pct.abs();

        let profit_score = normalize(metrics.total_profit_pct, -50.0, 100.0);
        let sharpe_score = normalize(metrics.sharpe_ratio, -2.0, 4.0);
        let drawdown_score = 1.0 - normalize(drawdown, 0.0, 100.0);
        let winrate_score = normalize(metrics.win_rate, 0.0, 100.0);
        let stability_score = (normalize(metrics.sortino_ratio, -2.0, 4.0)
            + normalize(metrics.calmar_ratio, -2.0, 4.0)
            + normalize(metrics.profit_factor, 0.0, 3.0))
            / 3.0;

        let weights = &self.weights;
        let mut fitness = weights.profit * profit_score
            + weights.sharpe * sharpe_score
            + weights.drawdown * drawdown_score
            + weights.winrate * winrate_score
            + weights.stability * stability_score
            + weights.trade_count * trade_count_score(metrics.trades_count);

        if metrics.total_profit_pct < 0.0 {
            fitness *= 0.3;
        }
        if drawdown > 50.0 {
            fitness *= 0.5;
        } else if drawdown > 30.0 {
            fitness *= 0.7;
        }
        if metrics.win_rate < 30.0 {
            fitness *= 0.7;
        }
        if metrics.trades_count < 10 {
            fitness *= 0.4;
        } else if metrics.trades_count < 20 {
            fitness *= 0.7;
        }

        fitness.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_metrics() -> BacktestMetrics {
        BacktestMetrics {
            total_profit_pct: 25.0,
            total_profit_abs: 250.0,
            trades_count: 80,
            wins: 48,
            losses: 30,
            draws: 2,
            win_rate: 60.0,
            avg_profit: 0.3,
            avg_duration: 120.0,
            max_drawdown_pct: -12.0,
            sharpe_ratio: 1.4,
            sortino_ratio: 1.8,
            calmar_ratio: 1.1,
            profit_factor: 1.6,
            expectancy: 0.2,
        }
    }

    #[test]
    fn test_zero_trades_scores_zero() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let metrics = BacktestMetrics {
            total_profit_pct: 80.0,
            win_rate: 90.0,
            trades_count: 0,
            ..BacktestMetrics::default()
        };
        assert_eq!(calc.score(&metrics), 0.0);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let extremes = [
            BacktestMetrics {
                total_profit_pct: 10_000.0,
                sharpe_ratio: 50.0,
                sortino_ratio: 50.0,
                calmar_ratio: 50.0,
                profit_factor: 99.0,
                win_rate: 100.0,
                trades_count: 100,
                ..BacktestMetrics::default()
            },
            BacktestMetrics {
                total_profit_pct: -99.0,
                sharpe_ratio: -50.0,
                max_drawdown_pct: -95.0,
                win_rate: 2.0,
                trades_count: 3,
                ..BacktestMetrics::default()
            },
            BacktestMetrics {
                sharpe_ratio: f64::NAN,
                profit_factor: f64::INFINITY,
                trades_count: 40,
                ..BacktestMetrics::default()
            },
        ];
        for metrics in extremes {
            let score = calc.score(&metrics);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn test_healthy_strategy_beats_losing_strategy() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let healthy = calc.score(&healthy_metrics());
        let losing = calc.score(&BacktestMetrics {
            total_profit_pct: -20.0,
            ..healthy_metrics()
        });
        assert!(healthy > losing);
    }

    #[test]
    fn test_negative_profit_penalty_applied() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let mut metrics = healthy_metrics();
        let baseline = calc.score(&metrics);
        metrics.total_profit_pct = -0.1;
        let penalized = calc.score(&metrics);
        // the 0.3 multiplier dominates the small component shift
        assert!(penalized < baseline * 0.5);
    }

    #[test]
    fn test_deep_drawdown_penalized_harder_than_moderate() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let moderate = calc.score(&BacktestMetrics {
            max_drawdown_pct: -35.0,
            ..healthy_metrics()
        });
        let deep = calc.score(&BacktestMetrics {
            max_drawdown_pct: -60.0,
            ..healthy_metrics()
        });
        assert!(deep < moderate);
    }

    #[test]
    fn test_trade_count_curve() {
        assert_eq!(trade_count_score(0), 0.0);
        assert_eq!(trade_count_score(9), 0.0);
        assert_eq!(trade_count_score(10), 0.3);
        assert_eq!(trade_count_score(29), 0.3);
        assert_eq!(trade_count_score(30), 1.0);
        assert_eq!(trade_count_score(200), 1.0);
        assert_eq!(trade_count_score(201), 0.8);
        assert_eq!(trade_count_score(500), 0.8);
        assert_eq!(trade_count_score(501), 0.5);
    }

    #[test]
    fn test_sparse_trading_penalized() {
        let calc = FitnessCalculator::new(FitnessWeights::default());
        let sparse = calc.score(&BacktestMetrics {
            trades_count: 12,
            ..healthy_metrics()
        });
        let active = calc.score(&healthy_metrics());
        assert!(sparse < active);
    }
}

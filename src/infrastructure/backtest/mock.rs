//! In-memory evaluator producing plausible metrics, for dry runs and tests.

use crate::domain::descriptor::StrategyDescriptor;
use crate::domain::errors::EvaluationError;
use crate::domain::metrics::BacktestMetrics;
use crate::domain::ports::StrategyEvaluator;
use async_trait::async_trait;
use rand::Rng;

/// Fake backtester. Results are random per call and not tied to the genome,
/// which is enough to exercise the full evolution pipeline without a market
/// data setup.
pub struct MockEvaluator {
    failure_rate: f64,
    zero_trade_rate: f64,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self {
            failure_rate: 0.0,
            zero_trade_rate: 0.0,
        }
    }

    /// Fraction of evaluations that fail with a process error.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fraction of evaluations that report a tradeless backtest.
    pub fn with_zero_trade_rate(mut self, rate: f64) -> Self {
        self.zero_trade_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl Default for MockEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyEvaluator for MockEvaluator {
    async fn evaluate(
        &self,
        _descriptor: &StrategyDescriptor,
    ) -> Result<BacktestMetrics, EvaluationError> {
        let mut rng = rand::rng();

        if self.failure_rate > 0.0 && rng.random_bool(self.failure_rate) {
            return Err(EvaluationError::ProcessFailed {
                status: 1,
                stderr: "simulated backtest failure".to_string(),
            });
        }
        if self.zero_trade_rate > 0.0 && rng.random_bool(self.zero_trade_rate) {
            return Err(EvaluationError::ZeroTrades);
        }

        let trades_count = rng.random_range(50..=200);
        let win_rate = rng.random_range(40.0..=70.0);
        let wins = (trades_count as f64 * win_rate / 100.0).round() as u32;
        let total_profit_pct = rng.random_range(-10.0..=30.0);

        Ok(BacktestMetrics {
            total_profit_pct,
            total_profit_abs: total_profit_pct * 10.0,
            trades_count,
            wins,
            losses: trades_count - wins,
            draws: 0,
            win_rate,
            avg_profit: total_profit_pct / trades_count as f64,
            avg_duration: rng.random_range(30.0..=600.0),
            max_drawdown_pct: -rng.random_range(2.0..=35.0),
            sharpe_ratio: rng.random_range(-0.5..=2.5),
            sortino_ratio: rng.random_range(-0.5..=3.0),
            calmar_ratio: rng.random_range(-0.5..=2.0),
            profit_factor: rng.random_range(0.7..=2.2),
            expectancy: rng.random_range(-0.1..=0.4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evolution::generator::RandomDescriptorGenerator;
    use crate::domain::ports::DescriptorGenerator;

    #[tokio::test]
    async fn test_mock_metrics_are_plausible() {
        let mut generator = RandomDescriptorGenerator::new(Some(1));
        let descriptor = generator.generate(0, 0).unwrap();
        let evaluator = MockEvaluator::new();
        for _ in 0..20 {
            let metrics = evaluator.evaluate(&descriptor).await.unwrap();
            assert!((50..=200).contains(&metrics.trades_count));
            assert!(metrics.max_drawdown_pct < 0.0);
            assert_eq!(metrics.wins + metrics.losses, metrics.trades_count);
        }
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_fails() {
        let mut generator = RandomDescriptorGenerator::new(Some(2));
        let descriptor = generator.generate(0, 0).unwrap();
        let evaluator = MockEvaluator::new().with_failure_rate(1.0);
        assert!(evaluator.evaluate(&descriptor).await.is_err());
    }
}

//! Parsing of backtester output into [`BacktestMetrics`].
//!
//! The backtester is expected to emit a single JSON line holding a
//! `"strategy"` object with the run summary. Older wrapper versions print
//! only the human-readable summary table, so a line-oriented text parser
//! remains as a fallback.

use crate::domain::errors::EvaluationError;
use crate::domain::metrics::BacktestMetrics;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawReport {
    strategy: RawStrategyReport,
}

/// Summary object as emitted by the backtest wrapper. Ratios are on a 0-1
/// scale and converted to percent here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStrategyReport {
    profit_total: f64,
    profit_total_abs: f64,
    total_trades: u32,
    wins: u32,
    losses: u32,
    draws: u32,
    winrate: f64,
    avg_profit: f64,
    avg_duration: f64,
    max_drawdown: f64,
    sharpe: f64,
    sortino: f64,
    calmar: f64,
    profit_factor: f64,
    expectancy: f64,
}

impl From<RawStrategyReport> for BacktestMetrics {
    fn from(raw: RawStrategyReport) -> Self {
        BacktestMetrics {
            total_profit_pct: raw.profit_total * 100.0,
            total_profit_abs: raw.profit_total_abs,
            trades_count: raw.total_trades,
            wins: raw.wins,
            losses: raw.losses,
            draws: raw.draws,
            win_rate: raw.winrate * 100.0,
            avg_profit: raw.avg_profit,
            avg_duration: raw.avg_duration,
            max_drawdown_pct: -(raw.max_drawdown.abs() * 100.0),
            sharpe_ratio: raw.sharpe,
            sortino_ratio: raw.sortino,
            calmar_ratio: raw.calmar,
            profit_factor: raw.profit_factor,
            expectancy: raw.expectancy,
        }
    }
}

/// Parses backtester stdout. A run that produced zero trades is reported as
/// [`EvaluationError::ZeroTrades`] so the caller can score it without
/// treating it as broken.
pub fn parse_output(stdout: &str) -> Result<BacktestMetrics, EvaluationError> {
    let metrics = parse_json_line(stdout)
        .or_else(|| parse_summary_table(stdout))
        .ok_or_else(|| EvaluationError::UnparseableOutput {
            reason: "no strategy summary found in backtester output".to_string(),
        })?;

    if metrics.trades_count == 0 {
        return Err(EvaluationError::ZeroTrades);
    }
    Ok(metrics)
}

fn parse_json_line(stdout: &str) -> Option<BacktestMetrics> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<RawReport>(line).ok())
        .map(|report| report.strategy.into())
}

/// Fallback for the human-readable summary table. Percent columns are
/// already on the 0-100 scale there.
fn parse_summary_table(stdout: &str) -> Option<BacktestMetrics> {
    let mut metrics = BacktestMetrics::default();
    let mut found_trades = false;

    for line in stdout.lines() {
        let cells: Vec<&str> = line
            .trim_matches(|c: char| c.is_whitespace() || c == '│' || c == '|')
            .split(['│', '|'])
            .map(str::trim)
            .collect();
        let [label, value, ..] = cells.as_slice() else {
            continue;
        };

        let number = value
            .split_whitespace()
            .next()
            .map(|v| v.trim_end_matches('%'))
            .and_then(|v| v.parse::<f64>().ok());
        let Some(number) = number else { continue };

        match *label {
            "Total trades" | "Total/Daily Avg Trades" => {
                metrics.trades_count = number as u32;
                found_trades = true;
            }
            "Total profit %" => metrics.total_profit_pct = number,
            "Absolute profit" => metrics.total_profit_abs = number,
            "Sharpe" => metrics.sharpe_ratio = number,
            "Sortino" => metrics.sortino_ratio = number,
            "Calmar" => metrics.calmar_ratio = number,
            "Profit factor" => metrics.profit_factor = number,
            "Expectancy (Ratio)" | "Expectancy" => metrics.expectancy = number,
            "Max % of account underwater" | "Absolute drawdown" => {
                metrics.max_drawdown_pct = -number.abs();
            }
            _ => {}
        }
    }

    found_trades.then_some(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_LINE: &str = r#"{"strategy":{"profit_total":0.153,"profit_total_abs":153.2,"total_trades":84,"wins":50,"losses":30,"draws":4,"winrate":0.595,"avg_profit":0.18,"avg_duration":142.0,"max_drawdown":0.112,"sharpe":1.31,"sortino":1.9,"calmar":1.05,"profit_factor":1.45,"expectancy":0.12}}"#;

    #[test]
    fn test_json_line_parsed_and_scaled() {
        let output = format!("some log noise\n{JSON_LINE}\ntrailing line\n");
        let metrics = parse_output(&output).unwrap();
        assert_eq!(metrics.trades_count, 84);
        assert!((metrics.total_profit_pct - 15.3).abs() < 1e-9);
        assert!((metrics.win_rate - 59.5).abs() < 1e-9);
        assert!((metrics.max_drawdown_pct + 11.2).abs() < 1e-9);
        assert_eq!(metrics.sharpe_ratio, 1.31);
    }

    #[test]
    fn test_missing_json_fields_default() {
        let output = r#"{"strategy":{"total_trades":10,"profit_total":0.01}}"#;
        let metrics = parse_output(output).unwrap();
        assert_eq!(metrics.trades_count, 10);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_zero_trades_reported_as_such() {
        let output = r#"{"strategy":{"total_trades":0}}"#;
        assert!(matches!(parse_output(output), Err(EvaluationError::ZeroTrades)));
    }

    #[test]
    fn test_garbage_output_is_unparseable() {
        assert!(matches!(
            parse_output("nothing useful here"),
            Err(EvaluationError::UnparseableOutput { .. })
        ));
    }

    #[test]
    fn test_summary_table_fallback() {
        let output = "\
│ Total trades                │ 42          │\n\
│ Total profit %              │ 7.5%        │\n\
│ Absolute profit             │ 75.0 USDT   │\n\
│ Sharpe                      │ 1.10        │\n\
│ Profit factor               │ 1.30        │\n\
│ Max % of account underwater │ 14.2%       │\n";
        let metrics = parse_output(output).unwrap();
        assert_eq!(metrics.trades_count, 42);
        assert_eq!(metrics.total_profit_pct, 7.5);
        assert_eq!(metrics.max_drawdown_pct, -14.2);
        assert_eq!(metrics.profit_factor, 1.3);
    }
}

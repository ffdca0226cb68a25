//! Backtester invocation as an external process.
//!
//! The executable strategy artifact for a descriptor is produced out of
//! band by the code generator; this evaluator only needs the class name
//! derived from the descriptor id.

use crate::domain::descriptor::StrategyDescriptor;
use crate::domain::errors::EvaluationError;
use crate::domain::metrics::BacktestMetrics;
use crate::domain::ports::StrategyEvaluator;
use crate::infrastructure::backtest::report;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

const STDERR_SNIPPET_LEN: usize = 500;

/// How the backtester binary is reached.
#[derive(Debug, Clone)]
pub enum InvocationMode {
    /// `freqtrade` available on PATH (or an explicit binary path).
    Native { executable: String },
    /// `docker run` against an image with the backtester inside, with the
    /// user-data directory bind-mounted.
    Docker { image: String },
}

#[derive(Debug, Clone)]
pub struct BacktestSettings {
    pub mode: InvocationMode,
    pub config_path: PathBuf,
    pub user_data_dir: PathBuf,
    pub data_dir: PathBuf,
    pub strategy_dir: PathBuf,
    pub timerange: Option<String>,
}

pub struct ProcessBacktester {
    settings: BacktestSettings,
}

impl ProcessBacktester {
    pub fn new(settings: BacktestSettings) -> Self {
        Self { settings }
    }

    fn build_command(&self, strategy_class: &str) -> Command {
        let settings = &self.settings;
        let mut command = match &settings.mode {
            InvocationMode::Native { executable } => Command::new(executable),
            InvocationMode::Docker { image } => {
                let mut command = Command::new("docker");
                command.arg("run").arg("--rm").arg("-v").arg(format!(
                    "{}:/freqtrade/user_data",
                    settings.user_data_dir.display()
                ));
                command.arg(image);
                command
            }
        };

        command
            .arg("backtesting")
            .arg("--strategy")
            .arg(strategy_class)
            .arg("--config")
            .arg(&settings.config_path)
            .arg("--datadir")
            .arg(&settings.data_dir)
            .arg("--strategy-path")
            .arg(&settings.strategy_dir)
            .arg("--export")
            .arg("none")
            .arg("--breakdown")
            .arg("day");
        if let Some(timerange) = &settings.timerange {
            command.arg("--timerange").arg(timerange);
        }
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl StrategyEvaluator for ProcessBacktester {
    async fn evaluate(
        &self,
        descriptor: &StrategyDescriptor,
    ) -> Result<BacktestMetrics, EvaluationError> {
        let class_name = descriptor.id().class_name();
        debug!(id = %descriptor.id(), class = %class_name, "launching backtest");

        let output = self
            .build_command(&class_name)
            .output()
            .await
            .map_err(|e| EvaluationError::Spawn {
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.chars().take(STDERR_SNIPPET_LEN).collect();
            return Err(EvaluationError::ProcessFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: snippet,
            });
        }

        report::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

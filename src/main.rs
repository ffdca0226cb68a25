//! Stratevo - genetic search over rule-based trading strategies
//!
//! Evolves strategy descriptors generation by generation, scoring each one
//! with an external backtester (or the built-in mock for dry runs).
//!
//! # Usage
//! ```sh
//! stratevo run --mock --generations 20
//! stratevo run --resume --freqtrade-config user_data/config.json
//! stratevo leaderboard --top 10
//! ```
//!
//! # Environment Variables
//! - `EVO_POPULATION_SIZE`, `EVO_GENERATIONS`, `EVO_ELITE_SIZE`, ... override
//!   evolution defaults (see `EvolutionConfig::from_env`)
//! - `DATABASE_URL` - SQLite URL for evolution history
//!   (default: sqlite://data/stratevo.db)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stratevo::application::evolution::checkpoint::CheckpointStore;
use stratevo::application::evolution::evolution_loop::EvolutionLoop;
use stratevo::config::{EvolutionConfig, FitnessWeights};
use stratevo::domain::ports::{EvolutionStore, StrategyEvaluator};
use stratevo::infrastructure::backtest::mock::MockEvaluator;
use stratevo::infrastructure::backtest::process::{
    BacktestSettings, InvocationMode, ProcessBacktester,
};
use stratevo::infrastructure::persistence::database::Database;
use stratevo::infrastructure::persistence::evolution_store::SqliteEvolutionStore;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Genetic trading strategy evolution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evolution
    Run {
        /// Number of generations to evolve
        #[arg(short, long)]
        generations: Option<u32>,

        /// Population size per generation
        #[arg(short, long)]
        population: Option<usize>,

        /// Number of elite strategies carried over unchanged
        #[arg(long)]
        elite: Option<usize>,

        /// Per-child mutation probability
        #[arg(long)]
        mutation_rate: Option<f64>,

        /// Crossover probability per parent pair
        #[arg(long)]
        crossover_rate: Option<f64>,

        /// Fraction of offspring replaced by fresh random genomes
        #[arg(long)]
        new_random_rate: Option<f64>,

        /// Tournament size for parent selection
        #[arg(long)]
        tournament_size: Option<usize>,

        /// Generations between checkpoints
        #[arg(long)]
        checkpoint_interval: Option<u32>,

        /// Directory for checkpoint files
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Maximum concurrent backtests
        #[arg(long)]
        concurrency: Option<usize>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Use the built-in mock evaluator instead of a real backtester
        #[arg(long)]
        mock: bool,

        /// Resume from the latest checkpoint in the checkpoint directory
        #[arg(long)]
        resume: bool,

        /// Resume from a specific checkpoint file
        #[arg(long, conflicts_with = "resume")]
        resume_from: Option<PathBuf>,

        /// SQLite URL for evolution history
        #[arg(long)]
        db_url: Option<String>,

        /// TOML file overriding the fitness weights
        #[arg(long)]
        weights: Option<String>,

        /// Backtester executable (native mode)
        #[arg(long, default_value = "freqtrade")]
        backtester: String,

        /// Docker image to run the backtester in, instead of a native binary
        #[arg(long)]
        docker_image: Option<String>,

        /// Backtester configuration file
        #[arg(long, default_value = "user_data/config.json")]
        freqtrade_config: PathBuf,

        /// User-data directory (mounted into the container in docker mode)
        #[arg(long, default_value = "user_data")]
        user_data: PathBuf,

        /// Candle data directory
        #[arg(long, default_value = "user_data/data")]
        datadir: PathBuf,

        /// Directory holding the generated strategy files
        #[arg(long, default_value = "user_data/strategies")]
        strategy_path: PathBuf,

        /// Backtest timerange, e.g. 20240101-20240601
        #[arg(long)]
        timerange: Option<String>,
    },
    /// Show the best strategies found so far
    Leaderboard {
        /// Number of entries to display
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// SQLite URL for evolution history
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Show per-generation statistics of the stored run
    History {
        /// SQLite URL for evolution history
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Stratevo {} starting...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            generations,
            population,
            elite,
            mutation_rate,
            crossover_rate,
            new_random_rate,
            tournament_size,
            checkpoint_interval,
            checkpoint_dir,
            concurrency,
            seed,
            mock,
            resume,
            resume_from,
            db_url,
            weights,
            backtester,
            docker_image,
            freqtrade_config,
            user_data,
            datadir,
            strategy_path,
            timerange,
        } => {
            let mut config = EvolutionConfig::from_env();
            if let Some(generations) = generations {
                config.generations = generations;
            }
            if let Some(population) = population {
                config.population_size = population;
            }
            if let Some(elite) = elite {
                config.elite_size = elite;
            }
            if let Some(rate) = mutation_rate {
                config.mutation_rate = rate;
            }
            if let Some(rate) = crossover_rate {
                config.crossover_rate = rate;
            }
            if let Some(rate) = new_random_rate {
                config.new_random_rate = rate;
            }
            if let Some(k) = tournament_size {
                config.tournament_size = k;
            }
            if let Some(interval) = checkpoint_interval {
                config.checkpoint_interval = interval;
            }
            if let Some(dir) = checkpoint_dir {
                config.checkpoint_dir = dir;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_evaluations = concurrency;
            }
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(path) = weights {
                config.weights = FitnessWeights::from_toml_file(&path)?;
            }

            let evaluator: Arc<dyn StrategyEvaluator> = if mock {
                info!("Using mock evaluator (no real backtests)");
                Arc::new(MockEvaluator::new())
            } else {
                let mode = match docker_image {
                    Some(image) => InvocationMode::Docker { image },
                    None => InvocationMode::Native {
                        executable: backtester,
                    },
                };
                Arc::new(ProcessBacktester::new(BacktestSettings {
                    mode,
                    config_path: freqtrade_config,
                    user_data_dir: user_data,
                    data_dir: datadir,
                    strategy_dir: strategy_path,
                    timerange,
                }))
            };

            let store = connect_store(&database_url(db_url)).await;

            let mut evolution = if let Some(path) = resume_from {
                EvolutionLoop::resume_from(&path, config, evaluator, store)?
            } else if resume {
                let checkpoints = CheckpointStore::new(config.checkpoint_dir.clone());
                let latest = checkpoints
                    .latest()
                    .context("No checkpoint found to resume from")?;
                EvolutionLoop::resume_from(&latest, config, evaluator, store)?
            } else {
                EvolutionLoop::initialize(config, evaluator, store)?
            };

            let report = evolution.run().await?;
            info!("Evolved {} generations", report.generations_run);
            if let Some((descriptor, fitness)) = report.best {
                info!(
                    id = %descriptor.id(),
                    fitness = format!("{fitness:.4}"),
                    timeframe = %descriptor.timeframe(),
                    stop_loss = descriptor.stop_loss(),
                    "best strategy"
                );
            }
        }
        Commands::Leaderboard { top, db_url } => {
            let store = require_store(&database_url(db_url)).await?;
            let entries = store.top_strategies(top).await?;
            if entries.is_empty() {
                println!("No evaluated strategies stored yet.");
                return Ok(());
            }
            println!(
                "{:<12} {:>4} {:>9} {:>9} {:>7} {:>7}",
                "id", "gen", "fitness", "profit%", "trades", "win%"
            );
            for entry in entries {
                println!(
                    "{:<12} {:>4} {:>9.4} {:>9.2} {:>7} {:>7.1}",
                    entry.id.to_string(),
                    entry.generation,
                    entry.fitness,
                    entry.total_profit_pct,
                    entry.trades_count,
                    entry.win_rate
                );
            }
        }
        Commands::History { db_url } => {
            let store = require_store(&database_url(db_url)).await?;
            let history = store.generation_history().await?;
            if history.is_empty() {
                println!("No generation statistics stored yet.");
                return Ok(());
            }
            println!(
                "{:>4} {:>5} {:>9} {:>9} {:>9} {:>9}",
                "gen", "size", "best", "avg", "profit", "divers"
            );
            for stats in history {
                println!(
                    "{:>4} {:>5} {:>9.4} {:>9.4} {:>9.2} {:>9.3}",
                    stats.generation,
                    stats.population_size,
                    stats.best_fitness,
                    stats.avg_fitness,
                    stats.best_profit,
                    stats.diversity_score
                );
            }
        }
    }

    Ok(())
}

fn database_url(cli_override: Option<String>) -> String {
    cli_override
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://data/stratevo.db".to_string())
}

/// Best-effort store connection: a broken database downgrades the run to
/// checkpoint-only persistence.
async fn connect_store(db_url: &str) -> Option<Arc<dyn EvolutionStore>> {
    match Database::new(db_url).await {
        Ok(db) => Some(Arc::new(SqliteEvolutionStore::new(db))),
        Err(e) => {
            warn!("Evolution history disabled, database unavailable: {e:#}");
            None
        }
    }
}

async fn require_store(db_url: &str) -> Result<Arc<dyn EvolutionStore>> {
    let db = Database::new(db_url).await?;
    Ok(Arc::new(SqliteEvolutionStore::new(db)))
}

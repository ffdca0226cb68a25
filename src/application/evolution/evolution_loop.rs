//! The generational state machine: evaluate, record, persist, evolve.

use crate::application::evolution::checkpoint::CheckpointStore;
use crate::application::evolution::fitness::FitnessCalculator;
use crate::application::evolution::generator::RandomDescriptorGenerator;
use crate::application::evolution::genetic_ops::GeneticOps;
use crate::application::evolution::population::Population;
use crate::application::evolution::stats::{StatisticsInput, generation_statistics};
use crate::config::EvolutionConfig;
use crate::domain::descriptor::StrategyDescriptor;
use crate::domain::errors::{EvaluationError, EvolutionError};
use crate::domain::metrics::{FitnessRecord, GenerationStatistics};
use crate::domain::ports::{EvolutionStore, StrategyEvaluator};
use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Result of a completed run.
pub struct EvolutionReport {
    pub generations_run: u32,
    pub best: Option<(StrategyDescriptor, f64)>,
    pub history: Vec<GenerationStatistics>,
}

/// Drives a population through the configured number of generations.
///
/// Evaluation is concurrent and unordered; everything that touches the
/// population or the RNG happens on this task only, so a fixed seed replays
/// the same sequence of genomes regardless of backtest timing.
pub struct EvolutionLoop {
    config: EvolutionConfig,
    evaluator: Arc<dyn StrategyEvaluator>,
    store: Option<Arc<dyn EvolutionStore>>,
    checkpoints: CheckpointStore,
    calculator: FitnessCalculator,
    ops: GeneticOps,
    generator: RandomDescriptorGenerator,
    rng: StdRng,
    population: Population,
    history: Vec<GenerationStatistics>,
    last_counts: (usize, usize, usize),
}

impl EvolutionLoop {
    /// Starts a run from a fresh random generation zero.
    pub fn initialize(
        config: EvolutionConfig,
        evaluator: Arc<dyn StrategyEvaluator>,
        store: Option<Arc<dyn EvolutionStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut generator = RandomDescriptorGenerator::new(config.seed);
        let population = Population::initialize_random(config.population_size, &mut generator)?;
        Ok(Self::assemble(config, evaluator, store, generator, population))
    }

    /// Resumes from a checkpoint file. The population continues from the
    /// generation it was checkpointed at, re-evaluating only members that
    /// have no fitness record yet.
    pub fn resume_from(
        path: &Path,
        config: EvolutionConfig,
        evaluator: Arc<dyn StrategyEvaluator>,
        store: Option<Arc<dyn EvolutionStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointStore::new(config.checkpoint_dir.clone());
        let population = checkpoints.load(path)?;
        info!(
            generation = population.generation(),
            members = population.len(),
            "resumed from checkpoint"
        );
        let generator = RandomDescriptorGenerator::new(config.seed);
        Ok(Self::assemble(config, evaluator, store, generator, population))
    }

    fn assemble(
        config: EvolutionConfig,
        evaluator: Arc<dyn StrategyEvaluator>,
        store: Option<Arc<dyn EvolutionStore>>,
        generator: RandomDescriptorGenerator,
        population: Population,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };
        Self {
            checkpoints: CheckpointStore::new(config.checkpoint_dir.clone()),
            calculator: FitnessCalculator::new(config.weights),
            ops: GeneticOps::new(config.mutation_strength),
            evaluator,
            store,
            generator,
            rng,
            population,
            history: Vec::new(),
            last_counts: (0, 0, 0),
            config,
        }
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn history(&self) -> &[GenerationStatistics] {
        &self.history
    }

    /// Runs until the configured generation count is reached. Evaluation
    /// failures drop individual strategies; the run itself only aborts when
    /// a generation collapses below the viable minimum.
    pub async fn run(&mut self) -> Result<EvolutionReport> {
        let total = self.config.generations;
        let mut generations_run = 0;

        loop {
            let generation = self.population.generation();
            let last = generation + 1 >= total;

            self.evaluate_generation().await?;
            generations_run += 1;

            let stats = self.collect_statistics();
            info!(
                generation,
                best = format!("{:.4}", stats.best_fitness),
                avg = format!("{:.4}", stats.avg_fitness),
                diversity = format!("{:.3}", stats.diversity_score),
                dropped = stats.dropped,
                "generation evaluated"
            );
            for (rank, (descriptor, fitness)) in
                self.population.top_n(5).into_iter().enumerate()
            {
                info!(
                    rank = rank + 1,
                    id = %descriptor.id(),
                    fitness = format!("{fitness:.4}"),
                    timeframe = %descriptor.timeframe(),
                    "leader"
                );
            }

            self.persist(&stats).await;
            self.history.push(stats);

            if (generation + 1) % self.config.checkpoint_interval == 0 || last {
                if let Err(e) = self.checkpoints.save(&self.population) {
                    error!(generation, "failed to write checkpoint: {e:#}");
                }
            }

            if last {
                break;
            }

            self.population = self.population.evolve_generation(
                &self.config.evolve_params(),
                &self.ops,
                &mut self.generator,
                &mut self.rng,
            )?;
        }

        self.log_trend();
        let best = self
            .population
            .top_n(1)
            .first()
            .map(|(descriptor, fitness)| ((*descriptor).clone(), *fitness));
        Ok(EvolutionReport {
            generations_run,
            best,
            history: std::mem::take(&mut self.history),
        })
    }

    /// Backtests every pending member with bounded concurrency and applies
    /// the results. Strategies that never traded keep a zero-fitness record;
    /// other failures drop the member or default it, per configuration.
    async fn evaluate_generation(&mut self) -> Result<()> {
        let pending = self.population.pending_evaluation();
        let generation = self.population.generation();
        info!(
            generation,
            pending = pending.len(),
            concurrency = self.config.max_concurrent_evaluations,
            "evaluating generation"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_evaluations));
        let timeout = Duration::from_secs(self.config.evaluation_timeout_secs);
        let mut tasks = JoinSet::new();
        for descriptor in pending {
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let id = descriptor.id();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            id,
                            Err(EvaluationError::Spawn {
                                reason: "evaluation pool closed".to_string(),
                            }),
                        );
                    }
                };
                let outcome = match tokio::time::timeout(timeout, evaluator.evaluate(&descriptor))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EvaluationError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                };
                (id, outcome)
            });
        }

        let mut evaluated = 0usize;
        let mut dropped = 0usize;
        let mut defaulted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(metrics))) => {
                    let fitness = self.calculator.score(&metrics);
                    self.population
                        .update_fitness(id, FitnessRecord { fitness, metrics });
                    evaluated += 1;
                }
                Ok((id, Err(EvaluationError::ZeroTrades))) => {
                    // never traded: scored zero, but kept in the gene pool
                    self.population.update_fitness(id, FitnessRecord::default());
                    evaluated += 1;
                    defaulted += 1;
                }
                Ok((id, Err(e))) => {
                    warn!(%id, "evaluation failed: {e}");
                    if self.config.ignore_invalid {
                        self.population.remove(id);
                        dropped += 1;
                    } else {
                        self.population.update_fitness(id, FitnessRecord::default());
                        defaulted += 1;
                    }
                }
                Err(join_error) => {
                    warn!("evaluation task aborted: {join_error}");
                }
            }
        }

        self.last_counts = (evaluated, dropped, defaulted);

        let minimum = self.config.elite_size.max(2);
        if self.population.len() < minimum {
            return Err(EvolutionError::PopulationCollapse {
                generation,
                remaining: self.population.len(),
                minimum,
            }
            .into());
        }
        Ok(())
    }

    fn collect_statistics(&self) -> GenerationStatistics {
        let (evaluated, dropped, defaulted) = self.last_counts;
        generation_statistics(StatisticsInput {
            generation: self.population.generation(),
            population_size: self.population.len(),
            evaluated,
            dropped,
            defaulted,
            records: self.population.records().values().collect(),
        })
    }

    async fn persist(&self, stats: &GenerationStatistics) {
        let Some(store) = &self.store else {
            return;
        };
        // storage trouble must never kill a long run
        if let Err(e) = store.save_snapshot(&self.population.snapshot()).await {
            error!(generation = stats.generation, "failed to persist snapshot: {e:#}");
        }
        if let Err(e) = store.save_statistics(stats).await {
            error!(generation = stats.generation, "failed to persist statistics: {e:#}");
        }
    }

    fn log_trend(&self) {
        let (Some(first), Some(last)) = (self.history.first(), self.history.last()) else {
            return;
        };
        info!(
            generations = self.history.len(),
            initial_best = format!("{:.4}", first.best_fitness),
            final_best = format!("{:.4}", last.best_fitness),
            improvement = format!("{:+.4}", last.best_fitness - first.best_fitness),
            "run complete"
        );
    }
}

//! End-to-end evolution runs against the mock evaluator.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use stratevo::application::evolution::checkpoint::CheckpointStore;
use stratevo::application::evolution::evolution_loop::EvolutionLoop;
use stratevo::config::EvolutionConfig;
use stratevo::infrastructure::backtest::mock::MockEvaluator;

static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_checkpoint_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "stratevo-e2e-{}-{}",
        std::process::id(),
        DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ))
}

fn test_config(dir: &PathBuf) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 10,
        generations: 3,
        elite_size: 2,
        checkpoint_interval: 1,
        checkpoint_dir: dir.clone(),
        max_concurrent_evaluations: 4,
        evaluation_timeout_secs: 10,
        seed: Some(424242),
        ..EvolutionConfig::default()
    }
}

#[tokio::test]
async fn test_full_run_with_mock_evaluator() {
    let dir = temp_checkpoint_dir();
    let config = test_config(&dir);

    let mut evolution =
        EvolutionLoop::initialize(config, Arc::new(MockEvaluator::new()), None).unwrap();
    let report = evolution.run().await.unwrap();

    assert_eq!(report.generations_run, 3);
    assert_eq!(report.history.len(), 3);
    for stats in &report.history {
        assert_eq!(stats.population_size, 10);
        assert!((0.0..=1.0).contains(&stats.best_fitness));
        assert!((0.0..=1.0).contains(&stats.diversity_score));
        assert!(stats.best_fitness >= stats.avg_fitness);
    }
    let (best, fitness) = report.best.expect("a best strategy after three generations");
    assert!((0.0..=1.0).contains(&fitness));
    assert!(best.validate().is_ok());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_occasional_failures_do_not_abort_the_run() {
    let dir = temp_checkpoint_dir();
    let config = test_config(&dir);

    let evaluator = Arc::new(MockEvaluator::new().with_failure_rate(0.2).with_zero_trade_rate(0.1));
    let mut evolution = EvolutionLoop::initialize(config, evaluator, None).unwrap();
    let report = evolution.run().await.unwrap();

    assert_eq!(report.generations_run, 3);
    // some strategies were dropped or defaulted, none fatally
    for stats in &report.history {
        assert!(stats.population_size <= 10);
        assert!(stats.population_size >= 2);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_total_failure_collapses_the_population() {
    let dir = temp_checkpoint_dir();
    let config = test_config(&dir);

    let evaluator = Arc::new(MockEvaluator::new().with_failure_rate(1.0));
    let mut evolution = EvolutionLoop::initialize(config, evaluator, None).unwrap();
    assert!(evolution.run().await.is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_checkpoint_written_and_resumable() {
    let dir = temp_checkpoint_dir();
    let config = test_config(&dir);

    let mut evolution =
        EvolutionLoop::initialize(config.clone(), Arc::new(MockEvaluator::new()), None).unwrap();
    evolution.run().await.unwrap();

    let checkpoints = CheckpointStore::new(&dir);
    let latest = checkpoints.latest().expect("final checkpoint on disk");
    assert!(latest.ends_with("population_gen_0002.json"));

    // continue the same run for two more generations
    let extended = EvolutionConfig {
        generations: 5,
        ..config
    };
    let mut resumed = EvolutionLoop::resume_from(
        &latest,
        extended,
        Arc::new(MockEvaluator::new()),
        None,
    )
    .unwrap();
    assert_eq!(resumed.population().generation(), 2);
    assert_eq!(resumed.population().len(), 10);

    let report = resumed.run().await.unwrap();
    assert_eq!(report.generations_run, 3);
    assert_eq!(resumed.population().generation(), 4);

    let _ = std::fs::remove_dir_all(&dir);
}

//! Checkpointing: durable JSON snapshots of a generation, written atomically
//! so a crash mid-write never corrupts the latest resumable state.

use crate::application::evolution::population::Population;
use crate::domain::descriptor::DescriptorId;
use crate::domain::errors::EvolutionError;
use crate::domain::metrics::GenerationSnapshot;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Human-oriented sidecar written next to each checkpoint.
#[derive(Debug, Serialize)]
struct CheckpointSummary {
    generation: u32,
    population_size: usize,
    top: Vec<SummaryEntry>,
}

#[derive(Debug, Serialize)]
struct SummaryEntry {
    id: DescriptorId,
    fitness: f64,
    total_profit_pct: f64,
    trades_count: u32,
    parents: Vec<DescriptorId>,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn checkpoint_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("population_gen_{generation:04}.json"))
    }

    fn summary_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("summary_gen_{generation:04}.json"))
    }

    /// Writes the full snapshot plus a top-10 summary sidecar. Returns the
    /// checkpoint path.
    pub fn save(&self, population: &Population) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create checkpoint dir {}", self.dir.display()))?;

        let snapshot = population.snapshot();
        let path = self.checkpoint_path(snapshot.generation);
        write_json_atomic(&path, &snapshot)?;

        let summary = CheckpointSummary {
            generation: snapshot.generation,
            population_size: population.len(),
            top: population
                .top_n(10)
                .into_iter()
                .map(|(descriptor, fitness)| {
                    let record = population.records().get(&descriptor.id());
                    SummaryEntry {
                        id: descriptor.id(),
                        fitness,
                        total_profit_pct: record
                            .map(|r| r.metrics.total_profit_pct)
                            .unwrap_or(0.0),
                        trades_count: record.map(|r| r.metrics.trades_count).unwrap_or(0),
                        parents: population.parents_of(descriptor.id()).to_vec(),
                    }
                })
                .collect(),
        };
        write_json_atomic(&self.summary_path(snapshot.generation), &summary)?;

        info!(generation = snapshot.generation, path = %path.display(), "checkpoint written");
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Population, EvolutionError> {
        let fail = |reason: String| EvolutionError::CheckpointLoad {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let snapshot: GenerationSnapshot =
            serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;
        Ok(Population::from_snapshot(snapshot))
    }

    /// Most recent checkpoint in the directory, by generation number in the
    /// file name. `None` when the directory is missing or holds none.
    pub fn latest(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.dir).ok()?;
        entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let generation: u32 = name
                    .strip_prefix("population_gen_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()?;
                Some((generation, entry.path()))
            })
            .max_by_key(|(generation, _)| *generation)
            .map(|(_, path)| path)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize checkpoint")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move checkpoint into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evolution::generator::RandomDescriptorGenerator;
    use crate::domain::metrics::{BacktestMetrics, FitnessRecord};
    use std::sync::atomic::{AtomicU64, Ordering};

    static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stratevo-checkpoint-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_population(size: usize) -> Population {
        let mut generator = RandomDescriptorGenerator::new(Some(21));
        let mut population = Population::initialize_random(size, &mut generator).unwrap();
        let ids: Vec<DescriptorId> = population.descriptors().iter().map(|d| d.id()).collect();
        for (i, id) in ids.into_iter().enumerate() {
            population.update_fitness(
                id,
                FitnessRecord {
                    fitness: i as f64 / 10.0,
                    metrics: BacktestMetrics {
                        trades_count: 40,
                        total_profit_pct: i as f64,
                        ..BacktestMetrics::default()
                    },
                },
            );
        }
        population
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = temp_dir();
        let store = CheckpointStore::new(&dir);
        let population = sample_population(5);

        let path = store.save(&population).unwrap();
        assert!(path.exists());

        let restored = store.load(&path).unwrap();
        assert_eq!(restored.generation(), population.generation());
        assert_eq!(restored.descriptors(), population.descriptors());
        assert_eq!(restored.records(), population.records());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_summary_sidecar_written() {
        let dir = temp_dir();
        let store = CheckpointStore::new(&dir);
        store.save(&sample_population(5)).unwrap();
        let summary = fs::read_to_string(dir.join("summary_gen_0000.json")).unwrap();
        assert!(summary.contains("\"generation\": 0"));
        assert!(summary.contains("gen000-"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_latest_picks_highest_generation() {
        let dir = temp_dir();
        let store = CheckpointStore::new(&dir);
        let population = sample_population(4);
        store.save(&population).unwrap();

        let mut generator = RandomDescriptorGenerator::new(Some(22));
        let ops = crate::application::evolution::genetic_ops::GeneticOps::new(0.15);
        let params = crate::config::EvolutionConfig::default().evolve_params();
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(23);
        let next = population
            .evolve_generation(&params, &ops, &mut generator, &mut rng)
            .unwrap();
        store.save(&next).unwrap();

        let latest = store.latest().unwrap();
        assert!(latest.ends_with("population_gen_0001.json"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_corrupt_checkpoint() {
        let dir = temp_dir();
        let path = dir.join("population_gen_0000.json");
        fs::write(&path, "not json").unwrap();
        let store = CheckpointStore::new(&dir);
        assert!(matches!(
            store.load(&path),
            Err(EvolutionError::CheckpointLoad { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_latest_on_missing_dir_is_none() {
        let store = CheckpointStore::new("/nonexistent/stratevo-checkpoints");
        assert!(store.latest().is_none());
    }
}

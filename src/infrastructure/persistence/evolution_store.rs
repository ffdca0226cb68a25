//! SQLite-backed evolution history.

use crate::domain::descriptor::DescriptorId;
use crate::domain::metrics::{
    BacktestMetrics, GenerationSnapshot, GenerationStatistics, LeaderboardEntry,
};
use crate::domain::ports::EvolutionStore;
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

pub struct SqliteEvolutionStore {
    db: Database,
}

impl SqliteEvolutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EvolutionStore for SqliteEvolutionStore {
    async fn save_snapshot(&self, snapshot: &GenerationSnapshot) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;

        for descriptor in &snapshot.descriptors {
            let id = descriptor.id();
            let genome = serde_json::to_string(descriptor)
                .context("Failed to serialize strategy genome")?;
            let parents: Vec<DescriptorId> = snapshot
                .genealogy
                .get(&id)
                .cloned()
                .unwrap_or_default();
            let parents_json =
                serde_json::to_string(&parents).context("Failed to serialize parent ids")?;

            sqlx::query(
                r#"
                INSERT INTO strategies (id, generation, genome, parents, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(id.to_string())
            .bind(id.generation)
            .bind(genome)
            .bind(parents_json)
            .bind(snapshot.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert strategy")?;
        }

        for (id, record) in &snapshot.records {
            let metrics = serde_json::to_string(&record.metrics)
                .context("Failed to serialize backtest metrics")?;
            sqlx::query(
                r#"
                INSERT INTO results (strategy_id, generation, fitness, metrics, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(strategy_id, generation) DO UPDATE SET
                    fitness = excluded.fitness,
                    metrics = excluded.metrics
                "#,
            )
            .bind(id.to_string())
            .bind(snapshot.generation)
            .bind(record.fitness)
            .bind(metrics)
            .bind(snapshot.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert result")?;
        }

        tx.commit().await.context("Failed to commit snapshot")?;
        Ok(())
    }

    async fn save_statistics(&self, stats: &GenerationStatistics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generations (
                generation, population_size, evaluated, dropped, defaulted,
                best_fitness, avg_fitness, worst_fitness, std_fitness,
                best_profit, avg_profit, diversity, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(generation) DO UPDATE SET
                population_size = excluded.population_size,
                evaluated = excluded.evaluated,
                dropped = excluded.dropped,
                defaulted = excluded.defaulted,
                best_fitness = excluded.best_fitness,
                avg_fitness = excluded.avg_fitness,
                worst_fitness = excluded.worst_fitness,
                std_fitness = excluded.std_fitness,
                best_profit = excluded.best_profit,
                avg_profit = excluded.avg_profit,
                diversity = excluded.diversity
            "#,
        )
        .bind(stats.generation)
        .bind(stats.population_size as i64)
        .bind(stats.evaluated as i64)
        .bind(stats.dropped as i64)
        .bind(stats.defaulted as i64)
        .bind(stats.best_fitness)
        .bind(stats.avg_fitness)
        .bind(stats.worst_fitness)
        .bind(stats.std_fitness)
        .bind(stats.best_profit)
        .bind(stats.avg_profit)
        .bind(stats.diversity_score)
        .bind(stats.created_at)
        .execute(&self.db.pool)
        .await
        .context("Failed to insert generation statistics")?;
        Ok(())
    }

    async fn top_strategies(&self, n: usize) -> Result<Vec<LeaderboardEntry>> {
        // elites reappear across generations, so over-fetch and dedupe by id
        let rows = sqlx::query(
            r#"
            SELECT strategy_id, generation, fitness, metrics
            FROM results
            ORDER BY fitness DESC, strategy_id ASC
            LIMIT ?
            "#,
        )
        .bind((n * 4) as i64)
        .fetch_all(&self.db.pool)
        .await
        .context("Failed to query leaderboard")?;

        let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(n);
        for row in rows {
            if entries.len() >= n {
                break;
            }
            let raw_id: String = row.get("strategy_id");
            let id: DescriptorId = raw_id
                .parse()
                .with_context(|| format!("Malformed strategy id in results table: {raw_id}"))?;
            if entries.iter().any(|e| e.id == id) {
                continue;
            }
            let metrics_json: String = row.get("metrics");
            let metrics: BacktestMetrics = serde_json::from_str(&metrics_json)
                .context("Failed to decode stored backtest metrics")?;
            entries.push(LeaderboardEntry {
                id,
                generation: row.get::<i64, _>("generation") as u32,
                fitness: row.get("fitness"),
                total_profit_pct: metrics.total_profit_pct,
                trades_count: metrics.trades_count,
                win_rate: metrics.win_rate,
            });
        }
        Ok(entries)
    }

    async fn generation_history(&self) -> Result<Vec<GenerationStatistics>> {
        let rows = sqlx::query(
            r#"
            SELECT generation, population_size, evaluated, dropped, defaulted,
                   best_fitness, avg_fitness, worst_fitness, std_fitness,
                   best_profit, avg_profit, diversity, created_at
            FROM generations
            ORDER BY generation ASC
            "#,
        )
        .fetch_all(&self.db.pool)
        .await
        .context("Failed to query generation history")?;

        Ok(rows
            .into_iter()
            .map(|row| GenerationStatistics {
                generation: row.get::<i64, _>("generation") as u32,
                population_size: row.get::<i64, _>("population_size") as usize,
                evaluated: row.get::<i64, _>("evaluated") as usize,
                dropped: row.get::<i64, _>("dropped") as usize,
                defaulted: row.get::<i64, _>("defaulted") as usize,
                best_fitness: row.get("best_fitness"),
                avg_fitness: row.get("avg_fitness"),
                worst_fitness: row.get("worst_fitness"),
                std_fitness: row.get("std_fitness"),
                best_profit: row.get("best_profit"),
                avg_profit: row.get("avg_profit"),
                diversity_score: row.get("diversity"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evolution::generator::RandomDescriptorGenerator;
    use crate::application::evolution::population::Population;
    use crate::domain::metrics::FitnessRecord;
    use std::sync::atomic::{AtomicU64, Ordering};

    static DB_SEQ: AtomicU64 = AtomicU64::new(0);

    async fn temp_store() -> (SqliteEvolutionStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "stratevo-store-{}-{}.db",
            std::process::id(),
            DB_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let db = Database::new(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        (SqliteEvolutionStore::new(db), path)
    }

    fn sample_snapshot() -> GenerationSnapshot {
        let mut generator = RandomDescriptorGenerator::new(Some(31));
        let mut population = Population::initialize_random(4, &mut generator).unwrap();
        let ids: Vec<DescriptorId> = population.descriptors().iter().map(|d| d.id()).collect();
        for (i, id) in ids.into_iter().enumerate() {
            population.update_fitness(
                id,
                FitnessRecord {
                    fitness: 0.2 * i as f64,
                    metrics: BacktestMetrics {
                        trades_count: 60,
                        total_profit_pct: 5.0 * i as f64,
                        win_rate: 55.0,
                        ..BacktestMetrics::default()
                    },
                },
            );
        }
        population.snapshot()
    }

    #[tokio::test]
    async fn test_snapshot_persists_and_leaderboard_reads_back() {
        let (store, path) = temp_store().await;
        let snapshot = sample_snapshot();
        store.save_snapshot(&snapshot).await.unwrap();
        // idempotent re-save of the same generation
        store.save_snapshot(&snapshot).await.unwrap();

        let top = store.top_strategies(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].fitness >= top[1].fitness);
        assert!((top[0].fitness - 0.6).abs() < 1e-9);
        assert_eq!(top[0].trades_count, 60);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_statistics_history_roundtrip() {
        let (store, path) = temp_store().await;
        for generation in 0..3u32 {
            store
                .save_statistics(&GenerationStatistics {
                    generation,
                    population_size: 10,
                    evaluated: 10,
                    dropped: 0,
                    defaulted: 0,
                    best_fitness: 0.5 + generation as f64 * 0.1,
                    avg_fitness: 0.3,
                    worst_fitness: 0.1,
                    std_fitness: 0.05,
                    best_profit: 12.0,
                    avg_profit: 4.0,
                    diversity_score: 0.7,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let history = store.generation_history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].generation, 0);
        assert!((history[2].best_fitness - 0.7).abs() < 1e-9);

        let _ = std::fs::remove_file(path);
    }
}

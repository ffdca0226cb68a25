use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite handle for evolution history.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                id TEXT PRIMARY KEY,
                generation INTEGER NOT NULL,
                genome TEXT NOT NULL,
                parents TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create strategies table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                strategy_id TEXT NOT NULL,
                generation INTEGER NOT NULL,
                fitness REAL NOT NULL,
                metrics TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (strategy_id, generation)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create results table")?;

        // Index for leaderboard queries
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_results_fitness
            ON results (fitness DESC);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create results index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generations (
                generation INTEGER PRIMARY KEY,
                population_size INTEGER NOT NULL,
                evaluated INTEGER NOT NULL,
                dropped INTEGER NOT NULL,
                defaulted INTEGER NOT NULL,
                best_fitness REAL NOT NULL,
                avg_fitness REAL NOT NULL,
                worst_fitness REAL NOT NULL,
                std_fitness REAL NOT NULL,
                best_profit REAL NOT NULL,
                avg_profit REAL NOT NULL,
                diversity REAL NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create generations table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}

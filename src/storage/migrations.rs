//! Schema bootstrap for the training queue.
//!
//! Each DDL statement of [`super::schema`] is one named step. Steps are
//! recorded in `_migrations` in the same transaction that runs them, so a
//! crashed bootstrap resumes at the first missing step.

use std::collections::HashSet;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use super::schema;

const MIGRATION_PREFIX: &str = "qa_schema_v1_part_";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A schema step was rejected by the server.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Applies the qa-forge schema to a PostgreSQL database.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies every step not yet recorded and returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let done = self.applied_names().await?;

        let pending: Vec<(String, &str)> = schema::all_schema_statements()
            .into_iter()
            .enumerate()
            .map(|(idx, sql)| (migration_name(idx), sql))
            .filter(|(name, _)| !done.contains(name))
            .collect();

        if pending.is_empty() {
            debug!("No pending schema steps");
            return Ok(0);
        }

        for (name, sql) in &pending {
            self.apply_step(name, sql).await?;
            info!(migration = %name, "Applied migration");
        }

        Ok(pending.len())
    }

    /// Lists recorded steps in the order they ran.
    pub async fn list_applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_migrations_table().await?;

        Ok(
            sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY applied_at, id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn applied_names(&self) -> Result<HashSet<String>, MigrationError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM _migrations WHERE name LIKE $1")
            .bind(format!("{}%", MIGRATION_PREFIX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn apply_step(&self, name: &str, sql: &str) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}: {}", name, e)))?;
        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn migration_name(idx: usize) -> String {
    format!("{}{}", MIGRATION_PREFIX, idx)
}

/// A step recorded in `_migrations`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

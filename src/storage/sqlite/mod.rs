//! SQLite implementation of the storage interfaces.
//!
//! One `SqliteStore` implements every interface over a shared pool so that
//! operations touching several tables (draw settlement, revenue allocation)
//! can run in a single transaction.
//!
//! Every write path runs under `BEGIN IMMEDIATE`, which takes the database
//! write lock up front. Concurrent writers queue on the lock (bounded by the
//! busy timeout) instead of racing read-modify-write cycles.

mod balance_store;
mod cycle_store;
mod revenue_store;
mod rows;
mod ticket_store;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::schema::CREATE_STATEMENTS;
use super::Result;
use crate::config::SqliteConfig;

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    ///
    /// An in-memory database is private to its connection, so the pool is
    /// limited to a single connection in that case.
    pub async fn connect(config: &SqliteConfig) -> Result<Self> {
        let in_memory = config.is_in_memory();
        let mut options = SqliteConnectOptions::from_str(&config.url())?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let max_connections = if in_memory { 1 } else { config.max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        debug!(path = %config.path, max_connections, "Opened SQLite pool");
        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for statement in CREATE_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Start a write transaction, taking the write lock immediately.
async fn begin_immediate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(())
}

/// Commit on success, roll back on any failure (including a failed commit).
async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e.into())
            }
        },
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

//! database (db) union structure.
#[cfg(test)]
pub mod memory;

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{Result, ServerError};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "coursekeeper";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared PostgreSQL pool with the per-query time budget.
#[derive(Clone, Debug)]
pub struct Database {
    pub postgres: PgPool,
    pub timeout: Duration,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
        timeout: Duration,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new()
            .max_connections(pool)
            .acquire_timeout(timeout);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres, timeout })
    }

    /// Wrap an existing pool.
    pub fn from_pool(postgres: PgPool) -> Self {
        Self {
            postgres,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Run one store operation within the query timeout.
    pub async fn timed<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "store operation timed out");
                Err(ServerError::Timeout)
            },
        }
    }
}

/// Whether `err` is a unique violation of `constraint`.
pub fn is_unique_violation(err: &ServerError, constraint: &str) -> bool {
    match err {
        ServerError::Sql(sqlx::Error::Database(db)) => {
            db.is_unique_violation() && db.constraint() == Some(constraint)
        },
        _ => false,
    }
}

mod customers;
mod email_logs;
mod knowledge;
mod logs;
mod messages;
mod tickets;
mod users;

use helpdesk_core::error::{HelpdeskError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub use knowledge::DocumentPage;

const DEFAULT_POOL_SIZE: u32 = 5;

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connects to `url` (e.g. `sqlite:helpdesk.db?mode=rwc`) and runs migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_POOL_SIZE)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        info!("Connected to SQLite at {}", url);

        let storage = Self { pool };
        storage.migrate().await?;

        Ok(storage)
    }

    /// A private in-memory database, used by tests and local runs.
    ///
    /// Pinned to a single connection that is never recycled: every
    /// connection to `sqlite::memory:` opens its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_err)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.migrate().await?;

        Ok(storage)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| HelpdeskError::Storage(e.to_string()))?;

        info!("SQLite migrations completed");
        Ok(())
    }

    /// Issues a trivial query to confirm the database answers.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn storage_err(e: sqlx::Error) -> HelpdeskError {
    HelpdeskError::Storage(e.to_string())
}

/// Maps a unique violation to `AlreadyExists`, anything else to `Storage`.
pub(crate) fn insert_err<'a>(entity: &'static str, id: &'a str) -> impl FnOnce(sqlx::Error) -> HelpdeskError + 'a {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return HelpdeskError::AlreadyExists {
                    entity,
                    id: id.to_string(),
                };
            }
        }
        storage_err(e)
    }
}

pub(crate) fn parse_column<T>(value: &str, column: &'static str) -> Result<T>
where
    T: FromStr,
{
    T::from_str(value)
        .map_err(|_| HelpdeskError::Storage(format!("Unexpected value '{}' in column {}", value, column)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn test_db() -> SqliteStorage {
        SqliteStorage::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn ping_succeeds_after_migrations() {
        let db = test_db().await;
        db.ping().await.unwrap();
    }
}

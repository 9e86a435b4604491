//! Database module for clipflow.
//!
//! SQLite persistence through sqlx: connection pools, migrations, models and
//! repositories. Reads go through a shared pool; every write goes through a
//! single-connection pool so only one connection ever contends for the SQLite
//! write lock.

pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

/// Read connection pool.
pub type DbPool = Pool<Sqlite>;

/// Serialized write pool (max_connections = 1).
pub type WritePool = Pool<Sqlite>;

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_url() -> String {
    "sqlite:clipflow.db?mode=rwc".to_string()
}

/// SQLite readers gain little beyond a handful of connections.
fn default_read_pool_size() -> u32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(2);
    (cores * 2).min(8)
}

fn default_busy_timeout_ms() -> u64 {
    30_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            read_pool_size: default_read_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Read `DATABASE_URL`, falling back to the defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.url = url;
        }
        config
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions, sqlx::Error> {
        Ok(SqliteConnectOptions::from_str(&self.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .foreign_keys(true)
            .create_if_missing(true))
    }
}

async fn apply_connection_pragmas(conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA wal_autocheckpoint = 1000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Open the read pool.
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.read_pool_size.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| Box::pin(async move { apply_connection_pragmas(conn).await }))
        .connect_with(config.connect_options()?)
        .await?;

    tracing::info!(
        max_connections = config.read_pool_size,
        "Database read pool initialized"
    );
    Ok(pool)
}

/// Open the serialized write pool.
pub async fn init_write_pool(config: &DatabaseConfig) -> Result<WritePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(60))
        .after_connect(|conn, _meta| Box::pin(async move { apply_connection_pragmas(conn).await }))
        .connect_with(config.connect_options()?)
        .await?;

    tracing::info!("Database write pool initialized (serialized writes)");
    Ok(pool)
}

pub async fn run_migrations(pool: &WritePool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Read and write pools for one database.
#[derive(Clone)]
pub struct Database {
    pub read: DbPool,
    pub write: WritePool,
}

impl Database {
    /// Open both pools and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> crate::Result<Self> {
        let write = init_write_pool(config).await?;
        run_migrations(&write).await?;
        let read = init_pool(config).await?;
        Ok(Self { read, write })
    }

    pub async fn close(&self) {
        self.read.close().await;
        self.write.close().await;
    }
}

/// Start a `BEGIN IMMEDIATE` transaction on the write pool.
///
/// Taking the write lock up front avoids the deadlock of two deferred
/// transactions both trying to upgrade from read to write.
pub async fn begin_immediate(pool: &WritePool) -> Result<ImmediateTransaction, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction {
        conn,
        finished: false,
    })
}

/// Manually managed immediate transaction.
///
/// Dropped without `commit`/`rollback`, the connection is closed instead of
/// being returned to the pool, which discards the open transaction.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.close_on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig::new(format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("test.db").display()
        ))
    }

    #[tokio::test]
    async fn test_connect_runs_migrations_in_wal_mode() {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_config(&dir)).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&db.read)
            .await
            .unwrap();
        assert_eq!(mode, "wal");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('ingest_job', 'job_metadata', 'transcript_segment', 'job_log')",
        )
        .fetch_one(&db.read)
        .await
        .unwrap();
        assert_eq!(tables, 4);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_config(&dir)).await.unwrap();

        {
            let mut tx = begin_immediate(&db.write).await.unwrap();
            sqlx::query(
                "INSERT INTO ingest_job (url, user_email, created_at, updated_at) VALUES ('u', 'e', 0, 0)",
            )
            .execute(&mut *tx)
            .await
            .unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingest_job")
            .fetch_one(&db.read)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite:clipflow.db?mode=rwc");
        assert!(config.read_pool_size >= 1);
    }
}

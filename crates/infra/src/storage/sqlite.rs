//! SQLite durable store
//!
//! One row per storage key holding the JSON-encoded entry list. Every save is
//! a single upsert inside a transaction, so readers see either the previous
//! list or the new one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_core::DurableStore;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tokio::task;
use tracing::{debug, info, instrument};

use crate::errors::InfraError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS queue_entries (
    storage_key TEXT PRIMARY KEY NOT NULL,
    entries     TEXT NOT NULL,
    updated_at  INTEGER NOT NULL
)";

const DEFAULT_POOL_SIZE: u32 = 4;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

type SqlitePool = Pool<SqliteConnectionManager>;

/// Pooled SQLite implementation of [`DurableStore`]
#[derive(Debug, Clone)]
pub struct SqliteDurableStore {
    pool: Arc<SqlitePool>,
}

impl SqliteDurableStore {
    /// Open (creating if needed) the database at `path`
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>) -> CommonResult<Self> {
        let path = path.as_ref();
        debug!(db_path = %path.display(), "Opening SQLite durable store");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| CommonError::storage_op("create_dir", err.to_string()))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
        });
        Self::with_manager(manager, DEFAULT_POOL_SIZE)
    }

    /// Private in-memory database, for tests
    pub fn in_memory() -> CommonResult<Self> {
        // Every pooled connection to `:memory:` is a separate database
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, max_size: u32) -> CommonResult<Self> {
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(|err| CommonError::from(InfraError::from(err)))?;

        let conn = pool.get().map_err(|err| CommonError::from(InfraError::from(err)))?;
        conn.execute_batch(SCHEMA).map_err(|err| CommonError::from(InfraError::from(err)))?;
        drop(conn);

        info!(pool_size = max_size, "SQLite durable store ready");
        Ok(Self { pool: Arc::new(pool) })
    }

    fn connection(pool: &SqlitePool) -> Result<PooledConnection<SqliteConnectionManager>, InfraError> {
        Ok(pool.get()?)
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    async fn load(&self, key: &str) -> CommonResult<Vec<Value>> {
        let pool = Arc::clone(&self.pool);
        let key = key.to_string();

        let stored = task::spawn_blocking(move || -> Result<Option<String>, InfraError> {
            let conn = Self::connection(&pool)?;
            let stored = conn
                .query_row(
                    "SELECT entries FROM queue_entries WHERE storage_key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(stored)
        })
        .await
        .map_err(InfraError::from)??;

        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()> {
        let pool = Arc::clone(&self.pool);
        let key = key.to_string();
        let json = serde_json::to_string(entries)?;
        let count = entries.len();

        task::spawn_blocking(move || -> Result<(), InfraError> {
            let mut conn = Self::connection(&pool)?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO queue_entries (storage_key, entries, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(storage_key) DO UPDATE SET
                     entries = excluded.entries,
                     updated_at = excluded.updated_at",
                params![key, json, Utc::now().timestamp_millis()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(InfraError::from)??;

        debug!(count, "Saved entries");
        Ok(())
    }
}

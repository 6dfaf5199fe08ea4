//! SQLite-backed implementation of the queue store port.
//!
//! Every call runs on the blocking pool. Writes that check before they act
//! (capacity, duplicate ids, read-modify-write updates) run inside one
//! `IMMEDIATE` transaction so concurrent writers cannot interleave.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use courier_core::QueueStore;
use courier_domain::{ItemPatch, ItemStatus, QueueError, QueueItem, Result};
use rusqlite::{params, OptionalExtension, Row, ToSql, TransactionBehavior};
use tokio::task;
use tracing::{debug, info, warn};

use super::manager::{DbConnection, DbManager};
use crate::errors::{map_join_error, map_sql_error, InfraError};

/// Durable queue store on a pooled SQLite database.
pub struct SqliteQueueStore {
    path: Option<PathBuf>,
    pool_size: u32,
    capacity: usize,
    db: OnceLock<Arc<DbManager>>,
}

impl SqliteQueueStore {
    /// Store that opens `path` on [`QueueStore::initialize`].
    pub fn open(path: impl Into<PathBuf>, pool_size: u32, capacity: usize) -> Self {
        Self { path: Some(path.into()), pool_size, capacity, db: OnceLock::new() }
    }

    /// Store on an already opened database.
    pub fn with_manager(db: Arc<DbManager>, capacity: usize) -> Self {
        Self { path: None, pool_size: 0, capacity, db: OnceLock::from(db) }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn db(&self) -> Result<Arc<DbManager>> {
        self.db
            .get()
            .cloned()
            .ok_or_else(|| QueueError::StoreUnavailable("sqlite store not initialised".into()))
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut DbConnection) -> Result<T> + Send + 'static,
    {
        let db = self.db()?;
        task::spawn_blocking(move || -> Result<T> {
            let mut conn = db.get_connection()?;
            op(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn query_items(&self, sql: &'static str, arg: Option<SqlArg>) -> Result<Vec<QueueItem>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(sql).map_err(map_sql_error)?;
            let rows = match &arg {
                Some(arg) => stmt.query_map([arg as &dyn ToSql], map_item_row),
                None => stmt.query_map([], map_item_row),
            }
            .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }
}

/// Owned single bind parameter for the lookup queries.
enum SqlArg {
    Text(String),
    Int(i64),
}

impl ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            Self::Text(value) => value.to_sql(),
            Self::Int(value) => value.to_sql(),
        }
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn initialize(&self) -> Result<()> {
        if let Ok(db) = self.db() {
            return task::spawn_blocking(move || db.run_migrations())
                .await
                .map_err(map_join_error)?;
        }

        let Some(path) = self.path.clone() else {
            return Err(QueueError::StoreUnavailable("no database path configured".into()));
        };
        let pool_size = self.pool_size;
        let db = task::spawn_blocking(move || -> Result<DbManager> {
            let db = DbManager::new(&path, pool_size)?;
            db.run_migrations()?;
            Ok(db)
        })
        .await
        .map_err(map_join_error)??;

        info!(db_path = %db.path().display(), capacity = self.capacity, "sqlite queue store ready");
        if self.db.set(Arc::new(db)).is_err() {
            debug!("sqlite queue store was initialised concurrently");
        }
        Ok(())
    }

    async fn add(&self, item: QueueItem) -> Result<QueueItem> {
        let capacity = self.capacity;
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let count: i64 =
                tx.query_row(COUNT_SQL, [], |row| row.get(0)).map_err(map_sql_error)?;
            if usize::try_from(count).unwrap_or(usize::MAX) >= capacity {
                return Err(QueueError::CapacityExceeded(capacity));
            }

            let exists: bool = tx
                .query_row(EXISTS_SQL, params![item.id], |row| row.get(0))
                .map_err(map_sql_error)?;
            if exists {
                return Err(QueueError::DuplicateId(item.id));
            }

            let metadata = serde_json::to_string(&item.metadata)
                .map_err(|e| QueueError::from(InfraError::from(e)))?;
            let timestamp = u64_to_i64(item.timestamp);
            let last_retry_at = item.last_retry_at.map(u64_to_i64);
            let status = item.status.as_str();
            let params: [&dyn ToSql; 12] = [
                &item.id,
                &item.conversation_id,
                &item.content,
                &item.message_type,
                &item.media_url,
                &item.receiver_id,
                &timestamp,
                &item.retry_count,
                &last_retry_at,
                &status,
                &item.last_error,
                &metadata,
            ];
            tx.execute(INSERT_SQL, params.as_slice()).map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(item)
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<QueueItem>> {
        self.query_items(SELECT_ALL_SQL, None).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(SELECT_BY_ID_SQL, params![id], map_item_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn update(&self, id: &str, patch: &ItemPatch) -> Result<QueueItem> {
        let id = id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let mut item = tx
                .query_row(SELECT_BY_ID_SQL, params![id], map_item_row)
                .optional()
                .map_err(map_sql_error)?
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            if patch.is_empty() {
                return Ok(item);
            }

            item.apply(&patch);
            let last_retry_at = item.last_retry_at.map(u64_to_i64);
            let status = item.status.as_str();
            let params: [&dyn ToSql; 5] = [
                &item.id,
                &status,
                &item.retry_count,
                &last_retry_at,
                &item.last_error,
            ];
            tx.execute(UPDATE_SQL, params.as_slice()).map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(item)
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(DELETE_SQL, params![id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let removed = self
            .with_conn(|conn| conn.execute(CLEAR_SQL, []).map_err(map_sql_error))
            .await?;
        debug!(removed, "sqlite queue cleared");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = self
            .with_conn(|conn| conn.query_row(COUNT_SQL, [], |row| row.get(0)).map_err(map_sql_error))
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn find_by_conversation(&self, conversation_id: &str) -> Result<Vec<QueueItem>> {
        self.query_items(SELECT_BY_CONVERSATION_SQL, Some(SqlArg::Text(conversation_id.to_string())))
            .await
    }

    async fn find_by_status(&self, status: ItemStatus) -> Result<Vec<QueueItem>> {
        self.query_items(SELECT_BY_STATUS_SQL, Some(SqlArg::Text(status.as_str().to_string()))).await
    }

    async fn find_by_min_retry_count(&self, min_retry_count: u32) -> Result<Vec<QueueItem>> {
        self.query_items(SELECT_BY_MIN_RETRY_SQL, Some(SqlArg::Int(i64::from(min_retry_count))))
            .await
    }

    async fn oldest(&self) -> Result<Option<QueueItem>> {
        self.with_conn(|conn| {
            conn.query_row(SELECT_OLDEST_SQL, [], map_item_row).optional().map_err(map_sql_error)
        })
        .await
    }
}

impl std::fmt::Debug for SqliteQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueueStore")
            .field("path", &self.db.get().map(|db| db.path().to_path_buf()).or_else(|| self.path.clone()))
            .field("capacity", &self.capacity)
            .field("initialised", &self.db.get().is_some())
            .finish()
    }
}

const INSERT_SQL: &str = "INSERT INTO queue_items (
        id, conversation_id, content, message_type, media_url, receiver_id,
        timestamp, retry_count, last_retry_at, status, last_error, metadata
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const UPDATE_SQL: &str = "UPDATE queue_items
    SET status = ?2, retry_count = ?3, last_retry_at = ?4, last_error = ?5
    WHERE id = ?1";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM queue_items";
const EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM queue_items WHERE id = ?1)";
const DELETE_SQL: &str = "DELETE FROM queue_items WHERE id = ?1";
const CLEAR_SQL: &str = "DELETE FROM queue_items";

const SELECT_ALL_SQL: &str = "SELECT id, conversation_id, content, message_type, media_url,
        receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items ORDER BY timestamp ASC, id ASC";
const SELECT_BY_ID_SQL: &str = "SELECT id, conversation_id, content, message_type, media_url,
        receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items WHERE id = ?1";
const SELECT_BY_CONVERSATION_SQL: &str = "SELECT id, conversation_id, content, message_type,
        media_url, receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items WHERE conversation_id = ?1 ORDER BY timestamp ASC, id ASC";
const SELECT_BY_STATUS_SQL: &str = "SELECT id, conversation_id, content, message_type, media_url,
        receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items WHERE status = ?1 ORDER BY timestamp ASC, id ASC";
const SELECT_BY_MIN_RETRY_SQL: &str = "SELECT id, conversation_id, content, message_type,
        media_url, receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items WHERE retry_count >= ?1 ORDER BY timestamp ASC, id ASC";
const SELECT_OLDEST_SQL: &str = "SELECT id, conversation_id, content, message_type, media_url,
        receiver_id, timestamp, retry_count, last_retry_at, status, last_error, metadata
    FROM queue_items ORDER BY timestamp ASC, id ASC LIMIT 1";

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(9)?;
    let metadata_raw: String = row.get(11)?;
    let status = parse_status(&id, &status_raw);
    let metadata = parse_metadata(&id, &metadata_raw);

    Ok(QueueItem {
        id,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        message_type: row.get(3)?,
        media_url: row.get(4)?,
        receiver_id: row.get(5)?,
        timestamp: i64_to_u64(row.get(6)?),
        retry_count: row.get(7)?,
        last_retry_at: row.get::<_, Option<i64>>(8)?.map(i64_to_u64),
        status,
        last_error: row.get(10)?,
        metadata,
    })
}

fn parse_status(id: &str, raw: &str) -> ItemStatus {
    match raw.parse::<ItemStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                item_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid queue item status in database, defaulting to pending"
            );
            ItemStatus::Pending
        }
    }
}

fn parse_metadata(id: &str, raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(item_id = %id, error = %err, "invalid queue item metadata in database, dropping it");
        BTreeMap::new()
    })
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

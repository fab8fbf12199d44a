//! SQLite backend implementation using sqlx.
//!
//! Provides connection pooling and the SQLite [`RecordStore`].

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};

use crate::collector::CollectionSnapshot;
use crate::storage::{CollectionRecord, RecordStore, StorageError};

/// Default maximum connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite connection pool wrapper.
///
/// Wraps sqlx's SqlitePool with sensible defaults for WAL mode and connection pooling.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Connect to a SQLite database.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g., `sqlite:data/webprofiler.db?mode=rwc`
    /// * `max_connections` - pool size; in-memory databases always use one
    ///   connection, since each connection would otherwise see its own database
    ///
    /// # Configuration
    ///
    /// - WAL journal mode for better concurrency
    /// - Normal synchronous mode for performance with durability
    /// - Foreign keys enforced
    /// - Create database if not exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(DEFAULT_CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        Ok(Self { inner: pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a store on an initialized pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_datas(
        &self,
        record: &mut CollectionRecord,
        id: i64,
    ) -> Result<(), StorageError> {
        let rows = sqlx::query(
            "SELECT collector, snapshot FROM collection_datas WHERE record_id = ? ORDER BY collector",
        )
        .bind(id)
        .fetch_all(self.pool.inner())
        .await?;

        for row in rows {
            let collector: String = row.try_get("collector")?;
            let snapshot: String = row.try_get("snapshot")?;
            let snapshot: CollectionSnapshot = serde_json::from_str(&snapshot)?;
            record.datas.insert(collector, snapshot);
        }
        Ok(())
    }
}

const RECORD_COLUMNS: &str =
    "id, token, url, ip, http_method, http_status, content_type, created_at";

fn record_from_row(row: &SqliteRow) -> Result<CollectionRecord, StorageError> {
    let http_status: i64 = row.try_get("http_status")?;
    let http_status = u16::try_from(http_status)
        .map_err(|_| StorageError::InvalidData(format!("http_status out of range: {http_status}")))?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(CollectionRecord {
        id: Some(row.try_get("id")?),
        token: row.try_get("token")?,
        url: row.try_get("url")?,
        ip: row.try_get("ip")?,
        http_method: row.try_get("http_method")?,
        http_status,
        content_type: row.try_get("content_type")?,
        datas: Default::default(),
        created_at: millis_to_datetime(created_at)?,
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::InvalidData(format!("invalid timestamp: {millis}")))
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &CollectionRecord) -> Result<i64, StorageError> {
        // Serialize everything up front so a bad snapshot never leaves a partial write.
        let snapshots = record
            .datas
            .iter()
            .map(|(collector, snapshot)| Ok((collector, serde_json::to_string(snapshot)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        let mut tx = self.pool.inner().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO collection_records
                 (token, url, ip, http_method, http_status, content_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&record.token)
        .bind(&record.url)
        .bind(&record.ip)
        .bind(&record.http_method)
        .bind(i64::from(record.http_status))
        .bind(record.content_type.as_deref())
        .bind(record.created_at.timestamp_millis())
        .fetch_one(&mut *tx)
        .await;

        let id: i64 = match inserted {
            Ok(row) => row.try_get("id")?,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StorageError::Conflict(record.token.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        for (collector, snapshot) in snapshots {
            sqlx::query(
                "INSERT INTO collection_datas (record_id, collector, snapshot) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(collector)
            .bind(snapshot)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(token = %record.token, id, "Record saved");
        Ok(id)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<CollectionRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM collection_records WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(self.pool.inner())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = record_from_row(&row)?;
        let id: i64 = row.try_get("id")?;
        self.load_datas(&mut record, id).await?;
        Ok(Some(record))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<CollectionRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM collection_records ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool.inner())
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = record_from_row(&row)?;
            let id: i64 = row.try_get("id")?;
            self.load_datas(&mut record, id).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn purge(&self, cutoff: Option<DateTime<Utc>>) -> Result<u64, StorageError> {
        let cutoff = cutoff.map_or(i64::MAX, |c| c.timestamp_millis());
        let mut tx = self.pool.inner().begin().await?;

        sqlx::query(
            "DELETE FROM collection_datas WHERE record_id IN
                 (SELECT id FROM collection_records WHERE created_at < ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM collection_records WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        tracing::info!(deleted, "Purged profiler records");
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collection_records")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectionContext, Status};
    use crate::storage::NewRecord;
    use crate::storage::schema::init_schema;

    async fn store() -> SqliteRecordStore {
        let pool = SqlitePool::connect("sqlite::memory:", DEFAULT_MAX_CONNECTIONS)
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        SqliteRecordStore::new(pool)
    }

    fn fields() -> NewRecord {
        NewRecord {
            url: "http://localhost/orders".into(),
            ip: "127.0.0.1".into(),
            http_method: "POST".into(),
            http_status: 201,
            content_type: Some("application/json".into()),
        }
    }

    #[tokio::test]
    async fn test_sqlite_pool_connect() {
        let pool = SqlitePool::connect("sqlite::memory:", 3).await.unwrap();
        assert!(!pool.is_closed());

        let row: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, 1);

        pool.close().await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_save_and_find_roundtrip() {
        let store = store().await;
        let mut record = store.create(fields());

        let mut ctx = CollectionContext::new();
        ctx.store("duration_ms", 12.5);
        ctx.set_status(Status::Success);
        record.datas.insert("time".into(), ctx.into_snapshot());
        record
            .datas
            .insert("broken".into(), CollectionSnapshot::failed("boom"));

        let id = store.save(&record).await.unwrap();
        let found = store.find_by_token(&record.token).await.unwrap().unwrap();

        assert_eq!(found.id, Some(id));
        assert_eq!(found.http_status, 201);
        assert_eq!(found.content_type.as_deref(), Some("application/json"));
        assert_eq!(found.datas, record.datas);
        assert_eq!(
            found.created_at.timestamp_millis(),
            record.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_find_unknown_token() {
        let store = store().await;
        assert!(store.find_by_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_is_conflict_and_atomic() {
        let store = store().await;
        let mut record = store.create(fields());
        record
            .datas
            .insert("time".into(), CollectionSnapshot::failed("x"));
        store.save(&record).await.unwrap();

        let err = store.save(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(store.count().await.unwrap(), 1);

        let (datas,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collection_datas")
            .fetch_one(store.pool.inner())
            .await
            .unwrap();
        assert_eq!(datas, 1);
    }

    #[tokio::test]
    async fn test_list_recent_and_purge() {
        let store = store().await;
        let mut tokens = Vec::new();
        for offset in [3, 2, 1] {
            let mut record = store.create(fields());
            record.created_at = Utc::now() - chrono::Duration::hours(offset);
            record
                .datas
                .insert("time".into(), CollectionSnapshot::failed("x"));
            store.save(&record).await.unwrap();
            tokens.push(record.token);
        }

        let recent = store.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].token, tokens[2]);
        assert_eq!(recent[0].datas.len(), 1);

        let deleted = store
            .purge(Some(Utc::now() - chrono::Duration::minutes(90)))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count().await.unwrap(), 1);

        assert_eq!(store.purge(None).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}

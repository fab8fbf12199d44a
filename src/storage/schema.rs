//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// Request/response summary, one row per profiled request.
pub const RECORDS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS collection_records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    token        TEXT NOT NULL UNIQUE,
    url          TEXT NOT NULL,
    ip           TEXT NOT NULL,
    http_method  TEXT NOT NULL,
    http_status  INTEGER NOT NULL,
    content_type TEXT,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_collection_records_created_at
    ON collection_records (created_at);
"#;

/// Collector snapshots, one row per (record, collector).
///
/// Snapshots are stored as JSON text.
pub const DATAS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS collection_datas (
    record_id INTEGER NOT NULL REFERENCES collection_records (id) ON DELETE CASCADE,
    collector TEXT NOT NULL,
    snapshot  TEXT NOT NULL,
    PRIMARY KEY (record_id, collector)
);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::raw_sql(RECORDS_TABLE_DDL)
        .execute(pool.inner())
        .await?;
    sqlx::raw_sql(DATAS_TABLE_DDL).execute(pool.inner()).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_initialization() {
        let pool = SqlitePool::connect("sqlite::memory:", 1).await.unwrap();
        init_schema(&pool).await.unwrap();
        // Idempotent
        init_schema(&pool).await.unwrap();

        for table in ["collection_records", "collection_datas"] {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(pool.inner())
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}

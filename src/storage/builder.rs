//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the record store.

use std::path::Path;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool, SqliteRecordStore};
use crate::storage::schema::init_schema;
use crate::storage::{MemoryRecordStore, RecordStore, StorageError};

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    driver: DatabaseDriver,
    dsn: String,
    max_connections: u32,
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// `memory` selects the in-memory store; anything else is treated as a
    /// SQLite connection URL.
    pub fn new(dsn: impl Into<String>) -> Self {
        let dsn = dsn.into();
        let driver = if dsn == "memory" {
            DatabaseDriver::Memory
        } else {
            DatabaseDriver::Sqlite
        };
        Self {
            driver,
            dsn,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// In-memory storage.
    pub fn memory() -> Self {
        Self::new("memory")
    }

    /// Storage described by the `database` configuration section.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            driver: config.driver,
            dsn: config.dsn.clone(),
            max_connections: config.max_connections,
        }
    }

    /// Set the maximum number of SQLite connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        match self.driver {
            DatabaseDriver::Memory => {
                tracing::info!("Using in-memory record store");
                Ok(StorageHandles {
                    records: Arc::new(MemoryRecordStore::new()),
                    pool: None,
                })
            }
            DatabaseDriver::Sqlite => {
                ensure_parent_dir(&self.dsn)?;
                let pool = SqlitePool::connect(&self.dsn, self.max_connections).await?;
                init_schema(&pool).await?;
                tracing::info!(dsn = %self.dsn, "Using SQLite record store");
                Ok(StorageHandles {
                    records: Arc::new(SqliteRecordStore::new(pool.clone())),
                    pool: Some(pool),
                })
            }
        }
    }
}

/// Create the directory of a file-backed SQLite URL if it doesn't exist.
fn ensure_parent_dir(dsn: &str) -> Result<(), StorageError> {
    let path = dsn
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to the storage layer.
pub struct StorageHandles {
    /// Record store shared by the engine and the profiler routes.
    pub records: Arc<dyn RecordStore>,
    pool: Option<SqlitePool>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer, closing database connections.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewRecord;
    use tempfile::tempdir;

    fn fields() -> NewRecord {
        NewRecord {
            url: "http://localhost/".into(),
            ip: "127.0.0.1".into(),
            http_method: "GET".into(),
            http_status: 200,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_memory_builder() {
        let handles = StorageBuilder::memory().build().await.unwrap();
        let record = handles.records.create(fields());
        handles.records.save(&record).await.unwrap();
        assert_eq!(handles.records.count().await.unwrap(), 1);
        handles.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_file_persists_across_builds() {
        let dir = tempdir().unwrap();
        let dsn = format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("nested/profiler.db").display()
        );

        let token = {
            let handles = StorageBuilder::new(&dsn).build().await.unwrap();
            let record = handles.records.create(fields());
            handles.records.save(&record).await.unwrap();
            handles.shutdown().await.unwrap();
            record.token
        };

        let handles = StorageBuilder::new(&dsn).build().await.unwrap();
        let found = handles.records.find_by_token(&token).await.unwrap();
        assert!(found.is_some());
        handles.shutdown().await.unwrap();
    }

    #[test]
    fn test_builder_driver_detection() {
        assert_eq!(StorageBuilder::new("memory").driver, DatabaseDriver::Memory);
        assert_eq!(
            StorageBuilder::new("sqlite::memory:").driver,
            DatabaseDriver::Sqlite
        );
    }
}

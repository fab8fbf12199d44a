//! Record store facade and the in-memory backend.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::storage::{CollectionRecord, NewRecord, StorageError};

/// Default number of records returned by listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Persistence of collection records.
///
/// `save` must be atomic: a record is either fully visible to
/// [`RecordStore::find_by_token`] with all of its collector data, or not at all.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Allocate an unsaved record with a fresh token.
    fn create(&self, fields: NewRecord) -> CollectionRecord {
        CollectionRecord::new(fields)
    }

    /// Persist a record and its collector data in one transaction.
    ///
    /// Returns the assigned database ID.
    ///
    /// # Errors
    /// Returns [`StorageError::Conflict`] if the token was already saved.
    async fn save(&self, record: &CollectionRecord) -> Result<i64, StorageError>;

    /// Fetch a record by token.
    async fn find_by_token(&self, token: &str) -> Result<Option<CollectionRecord>, StorageError>;

    /// Most recent records first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<CollectionRecord>, StorageError>;

    /// Delete records created before `cutoff`, or all records when `None`.
    ///
    /// Returns the number of deleted records.
    async fn purge(&self, cutoff: Option<DateTime<Utc>>) -> Result<u64, StorageError>;

    /// Number of stored records.
    async fn count(&self) -> Result<u64, StorageError>;
}

/// Volatile record store, mainly for tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: Vec<CollectionRecord>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &CollectionRecord) -> Result<i64, StorageError> {
        let mut state = self.inner.write().await;
        if state.records.iter().any(|r| r.token == record.token) {
            return Err(StorageError::Conflict(record.token.clone()));
        }

        state.next_id += 1;
        let id = state.next_id;
        let mut stored = record.clone();
        stored.id = Some(id);
        state.records.push(stored);
        Ok(id)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<CollectionRecord>, StorageError> {
        let state = self.inner.read().await;
        Ok(state.records.iter().find(|r| r.token == token).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<CollectionRecord>, StorageError> {
        let state = self.inner.read().await;
        Ok(state
            .records
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn purge(&self, cutoff: Option<DateTime<Utc>>) -> Result<u64, StorageError> {
        let mut state = self.inner.write().await;
        let before = state.records.len();
        match cutoff {
            Some(cutoff) => state.records.retain(|r| r.created_at >= cutoff),
            None => state.records.clear(),
        }
        Ok((before - state.records.len()) as u64)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().await.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectionSnapshot;

    fn fields(path: &str) -> NewRecord {
        NewRecord {
            url: format!("http://localhost{path}"),
            ip: "127.0.0.1".into(),
            http_method: "GET".into(),
            http_status: 200,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = MemoryRecordStore::new();
        let mut record = store.create(fields("/a"));
        record
            .datas
            .insert("time".into(), CollectionSnapshot::failed("x"));

        let id = store.save(&record).await.unwrap();
        assert_eq!(id, 1);

        let found = store.find_by_token(&record.token).await.unwrap().unwrap();
        assert_eq!(found.id, Some(1));
        assert_eq!(found.datas, record.datas);
        assert!(store.find_by_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_twice_conflicts() {
        let store = MemoryRecordStore::new();
        let record = store.create(fields("/a"));
        store.save(&record).await.unwrap();
        assert!(matches!(
            store.save(&record).await,
            Err(StorageError::Conflict(_))
        ));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_recent_and_purge() {
        let store = MemoryRecordStore::new();
        for path in ["/1", "/2", "/3"] {
            let record = store.create(fields(path));
            store.save(&record).await.unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "http://localhost/3");

        let deleted = store
            .purge(Some(Utc::now() - chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(deleted, 0);

        assert_eq!(store.purge(None).await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}

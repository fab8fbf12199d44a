//! Core data types for the storage layer.
//!
//! - [`NewRecord`]: Request/response summary captured before collectors run
//! - [`CollectionRecord`]: Persisted aggregate of every collector's output

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::CollectionSnapshot;

/// Summary fields used to create a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    /// Absolute request URL.
    pub url: String,
    /// Client address.
    pub ip: String,
    /// HTTP method.
    pub http_method: String,
    /// Response status code.
    pub http_status: u16,
    /// Response content type.
    pub content_type: Option<String>,
}

/// One profiled request.
///
/// The `token` is the only external handle: it is sent back to the browser
/// in response headers and used to fetch the record later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Database ID (None until saved).
    pub id: Option<i64>,
    /// Opaque unique token.
    pub token: String,
    /// Absolute request URL.
    pub url: String,
    /// Client address.
    pub ip: String,
    /// HTTP method.
    pub http_method: String,
    /// Response status code.
    pub http_status: u16,
    /// Response content type.
    pub content_type: Option<String>,
    /// Collector identifier -> collected snapshot.
    pub datas: BTreeMap<String, CollectionSnapshot>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

impl CollectionRecord {
    /// Create an unsaved record with a fresh random token and no data.
    pub fn new(fields: NewRecord) -> Self {
        Self {
            id: None,
            token: generate_token(),
            url: fields.url,
            ip: fields.ip,
            http_method: fields.http_method,
            http_status: fields.http_status,
            content_type: fields.content_type,
            datas: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot stored by a collector.
    pub fn data(&self, identifier: &str) -> Option<&CollectionSnapshot> {
        self.datas.get(identifier)
    }
}

/// Fresh opaque token (simple-format UUIDv4).
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> NewRecord {
        NewRecord {
            url: "http://localhost/".into(),
            ip: "127.0.0.1".into(),
            http_method: "GET".into(),
            http_status: 200,
            content_type: Some("text/html".into()),
        }
    }

    #[test]
    fn test_new_record_has_unique_token() {
        let a = CollectionRecord::new(fields());
        let b = CollectionRecord::new(fields());
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 32);
        assert!(a.id.is_none());
        assert!(a.datas.is_empty());
    }

    #[test]
    fn test_record_json_roundtrip() {
        let mut record = CollectionRecord::new(fields());
        record
            .datas
            .insert("time".into(), CollectionSnapshot::failed("boom"));

        let json = serde_json::to_string(&record).unwrap();
        let decoded: CollectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.data("time").unwrap().is_failure());
    }
}

//! Per-request collection and persistence.

use std::sync::Arc;

use crate::collector::{CollectionSnapshot, CollectorRegistry};
use crate::http::{ProfiledRequest, ProfiledResponse};
use crate::storage::{CollectionRecord, NewRecord, RecordStore, StorageError};

/// Runs every enabled collector against one request/response pair.
///
/// The request and response are copied on construction; collectors only
/// ever see these copies, never the live values the engine goes on to
/// rewrite.
#[derive(Debug, Clone)]
pub struct RequestProcessor {
    request: Arc<ProfiledRequest>,
    response: Arc<ProfiledResponse>,
}

impl RequestProcessor {
    /// Snapshot the exchange.
    pub fn new(request: &ProfiledRequest, response: &ProfiledResponse) -> Self {
        Self {
            request: Arc::new(request.clone()),
            response: Arc::new(response.clone()),
        }
    }

    /// Summary fields of the record.
    pub fn summary(&self) -> NewRecord {
        NewRecord {
            url: self.request.url(),
            ip: self.request.ip(),
            http_method: self.request.method().to_owned(),
            http_status: self.response.status.as_u16(),
            content_type: self.response.content_type().map(str::to_owned),
        }
    }

    /// Fill `record.datas` from every enabled collector, in registry order.
    ///
    /// Disabled collectors leave no entry. A failing collector gets a
    /// failure snapshot and the remaining collectors still run.
    pub fn collect_into(&self, registry: &CollectorRegistry, record: &mut CollectionRecord) {
        for definition in registry.all() {
            let identifier = definition.identifier();
            if !definition.is_enabled() {
                tracing::trace!(collector = identifier, "Collector disabled, skipping");
                continue;
            }

            let snapshot = match definition.collect(&self.request, &self.response) {
                Ok(ctx) => ctx.into_snapshot(),
                Err(e) => {
                    tracing::error!(
                        collector = identifier,
                        token = %record.token,
                        error = %e,
                        "Collection failed"
                    );
                    CollectionSnapshot::failed(&e)
                }
            };
            record.datas.insert(identifier.to_owned(), snapshot);
        }
    }

    /// Create the record, collect, and persist it in one atomic write.
    pub async fn save(
        self,
        registry: &CollectorRegistry,
        store: &dyn RecordStore,
    ) -> Result<CollectionRecord, StorageError> {
        let mut record = store.create(self.summary());
        self.collect_into(registry, &mut record);

        let id = store.save(&record).await?;
        record.id = Some(id);

        tracing::debug!(
            token = %record.token,
            collectors = record.datas.len(),
            "Profiling record saved"
        );
        Ok(record)
    }
}

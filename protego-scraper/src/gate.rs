//! Deduplicating ingestion gate
//!
//! The only writer of scraped records. For each normalized record it checks
//! whether (source_type, external_id) is already stored and inserts it if
//! not. A failure is counted against that record and never aborts the batch.

use protego_common::db::Store;
use protego_common::events::{EventBus, PipelineEvent};
use protego_common::models::{IngestionSummary, NewScrapedRecord};
use protego_common::StoreError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted(Uuid),
    Skipped,
    Failed,
}

pub struct IngestionGate {
    store: Arc<dyn Store>,
    events: EventBus,
    /// Serializes check-then-insert across adapters running concurrently
    write_lock: Mutex<()>,
}

impl IngestionGate {
    pub fn new(store: Arc<dyn Store>, events: EventBus) -> Self {
        Self {
            store,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// Ingest a batch, stopping early (between records) once `cancel` fires
    pub async fn ingest(
        &self,
        records: Vec<NewScrapedRecord>,
        cancel: &CancellationToken,
    ) -> IngestionSummary {
        let mut summary = IngestionSummary::default();
        let total = records.len();

        for (index, record) in records.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    processed = index,
                    remaining = total - index,
                    "Ingestion cancelled between records"
                );
                break;
            }

            match self.ingest_one(&record).await {
                RecordOutcome::Inserted(_) => summary.inserted += 1,
                RecordOutcome::Skipped => summary.skipped += 1,
                RecordOutcome::Failed => summary.failed += 1,
            }
        }

        summary
    }

    pub async fn ingest_one(&self, record: &NewScrapedRecord) -> RecordOutcome {
        let result = {
            let _guard = self.write_lock.lock().await;
            match self
                .store
                .find_by_external_id(record.source_type, &record.external_id)
                .await
            {
                Ok(Some(_)) => Ok(None),
                Ok(None) => self.store.insert_scraped_record(record).await.map(Some),
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(Some(record_id)) => {
                debug!(
                    source_type = %record.source_type,
                    external_id = %record.external_id,
                    %record_id,
                    "Record inserted"
                );
                self.events.emit_lossy(PipelineEvent::RecordInserted {
                    source_type: record.source_type,
                    external_id: record.external_id.clone(),
                    record_id,
                });
                RecordOutcome::Inserted(record_id)
            }
            Ok(None) => {
                debug!(
                    source_type = %record.source_type,
                    external_id = %record.external_id,
                    "Record already stored, skipped"
                );
                self.events.emit_lossy(PipelineEvent::RecordSkipped {
                    source_type: record.source_type,
                    external_id: record.external_id.clone(),
                });
                RecordOutcome::Skipped
            }
            Err(e) => {
                if matches!(e, StoreError::DuplicateKey { .. }) {
                    // Another writer stored it between our check and insert
                    warn!(
                        source_type = %record.source_type,
                        external_id = %record.external_id,
                        "Insert lost a race with another writer"
                    );
                } else {
                    error!(
                        source_type = %record.source_type,
                        external_id = %record.external_id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Failed to store record"
                    );
                }
                self.events.emit_lossy(PipelineEvent::RecordFailed {
                    source_type: record.source_type,
                    external_id: record.external_id.clone(),
                    reason: e.to_string(),
                });
                RecordOutcome::Failed
            }
        }
    }
}

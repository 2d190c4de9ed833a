//! Applies strategies to records and persists their outputs
//!
//! A record is all-or-nothing: if any strategy fails, nothing is written for
//! it and it stays unprocessed for the next pass.

use futures::stream::{self, StreamExt};
use protego_common::db::Store;
use protego_common::events::{EventBus, PipelineEvent};
use protego_common::models::{AnalysisBatch, OutputWrite, ScrapedRecord};
use protego_common::{AnalysisType, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::AnalysisError;
use crate::strategies::AnalysisStrategy;

/// Counts for one batch of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub outputs_inserted: usize,
    pub outputs_skipped: usize,
    /// Records left unscheduled because the run was cancelled
    pub cancelled: usize,
}

pub struct AnalysisEngine {
    strategies: Vec<Arc<dyn AnalysisStrategy>>,
    store: Arc<dyn Store>,
    events: EventBus,
    concurrency: usize,
}

impl AnalysisEngine {
    pub fn new(
        strategies: Vec<Arc<dyn AnalysisStrategy>>,
        store: Arc<dyn Store>,
        events: EventBus,
        concurrency: usize,
    ) -> Self {
        Self {
            strategies,
            store,
            events,
            concurrency: concurrency.max(1),
        }
    }

    pub fn analysis_types(&self) -> Vec<AnalysisType> {
        self.strategies.iter().map(|s| s.analysis_type()).collect()
    }

    /// Run every strategy over `record` without writing anything
    pub fn analyze(&self, record: &ScrapedRecord) -> Result<AnalysisBatch, AnalysisError> {
        let mut batch = AnalysisBatch::default();
        for strategy in &self.strategies {
            let outputs = strategy.analyze(record)?;
            debug!(
                record_id = %record.id,
                analysis_type = %strategy.analysis_type(),
                outputs = outputs.len(),
                "Strategy applied"
            );
            batch.analysis_types.push(strategy.analysis_type());
            batch.outputs.extend(outputs);
        }
        Ok(batch)
    }

    /// Analyze `record` and commit its outputs in one transaction
    pub async fn process(&self, record: &ScrapedRecord) -> Result<OutputWrite, AnalysisError> {
        let result = match self.analyze(record) {
            Ok(batch) => self
                .store
                .insert_analysis_outputs(record.id, &batch)
                .await
                .map(|write| (batch.analysis_types, write))
                .map_err(AnalysisError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok((analysis_types, write)) => {
                debug!(
                    record_id = %record.id,
                    inserted = write.inserted,
                    skipped = write.skipped,
                    "Record analyzed"
                );
                self.events.emit_lossy(PipelineEvent::RecordAnalyzed {
                    record_id: record.id,
                    analysis_types,
                    outputs_inserted: write.inserted,
                    outputs_skipped: write.skipped,
                });
                Ok(write)
            }
            Err(e) => {
                match &e {
                    AnalysisError::Store(StoreError::Referential { .. }) => {
                        error!(record_id = %record.id, error = %e, "Record vanished before its outputs were stored")
                    }
                    AnalysisError::Store(store_err) => {
                        warn!(
                            record_id = %record.id,
                            error = %e,
                            retryable = store_err.is_retryable(),
                            "Failed to store analysis outputs"
                        )
                    }
                    _ => warn!(record_id = %record.id, error = %e, "Analysis failed"),
                }
                self.events.emit_lossy(PipelineEvent::RecordAnalysisFailed {
                    record_id: record.id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Process up to `concurrency` records at a time
    ///
    /// Once `cancel` fires no further records are started; records already
    /// in flight finish.
    pub async fn process_batch(
        &self,
        records: Vec<ScrapedRecord>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let total = records.len();

        let results: Vec<Result<OutputWrite, AnalysisError>> = stream::iter(records)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|record| async move { self.process(&record).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport {
            cancelled: total - results.len(),
            ..BatchReport::default()
        };
        for result in results {
            match result {
                Ok(write) => {
                    report.processed += 1;
                    report.outputs_inserted += write.inserted;
                    report.outputs_skipped += write.skipped;
                }
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

//! Scheduled analysis pass
//!
//! Each run starts a fresh pass over the unprocessed records and works
//! through them batch by batch until none are left or the run is cancelled.

use async_trait::async_trait;
use protego_common::events::{EventBus, PipelineEvent};
use protego_common::scheduler::Job;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::AnalysisEngine;
use crate::selector::UnprocessedSelector;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisPassReport {
    pub batches: usize,
    pub processed: usize,
    pub failed: usize,
    pub outputs_inserted: usize,
    pub outputs_skipped: usize,
    pub cancelled: bool,
}

pub struct AnalysisJob {
    engine: Arc<AnalysisEngine>,
    selector: Mutex<UnprocessedSelector>,
    events: EventBus,
}

impl AnalysisJob {
    pub fn new(engine: Arc<AnalysisEngine>, selector: UnprocessedSelector, events: EventBus) -> Self {
        Self {
            engine,
            selector: Mutex::new(selector),
            events,
        }
    }
}

#[async_trait]
impl Job for AnalysisJob {
    type Report = AnalysisPassReport;

    fn name(&self) -> &'static str {
        "analysis"
    }

    async fn run(&self, cancel: CancellationToken) -> protego_common::Result<AnalysisPassReport> {
        let mut selector = self.selector.lock().await;
        selector.reset();

        let mut report = AnalysisPassReport::default();

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            // A store failure here ends the pass; the next run starts over
            let records = selector.next_batch().await?;
            if records.is_empty() {
                break;
            }

            report.batches += 1;
            let batch = self.engine.process_batch(records, &cancel).await;
            debug!(batch = report.batches, ?batch, "Batch processed");

            report.processed += batch.processed;
            report.failed += batch.failed;
            report.outputs_inserted += batch.outputs_inserted;
            report.outputs_skipped += batch.outputs_skipped;
            if batch.cancelled > 0 {
                report.cancelled = true;
                break;
            }
        }

        info!(
            batches = report.batches,
            processed = report.processed,
            failed = report.failed,
            outputs_inserted = report.outputs_inserted,
            cancelled = report.cancelled,
            "Analysis pass finished"
        );
        self.events.emit_lossy(PipelineEvent::PassCompleted {
            batches: report.batches,
            processed: report.processed,
            failed: report.failed,
            cancelled: report.cancelled,
        });

        Ok(report)
    }
}

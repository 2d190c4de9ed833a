//! Scheduled ingestion run
//!
//! One run fetches from every configured adapter concurrently, normalizes
//! each item and feeds the results through the shared ingestion gate. A
//! failing adapter is reported and does not affect the others.

use async_trait::async_trait;
use futures::future::join_all;
use protego_common::models::IngestionSummary;
use protego_common::scheduler::Job;
use protego_common::SourceType;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::gate::IngestionGate;
use crate::sources::SourceAdapter;

/// Outcome of one adapter within a run
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_type: SourceType,
    pub name: String,
    pub fetched: usize,
    pub normalization_failed: usize,
    pub summary: IngestionSummary,
    /// Set when the fetch itself failed
    pub error: Option<String>,
    /// The run was cancelled before this source was fetched
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub sources: Vec<SourceReport>,
}

impl IngestionReport {
    pub fn totals(&self) -> IngestionSummary {
        let mut totals = IngestionSummary::default();
        for source in &self.sources {
            totals += source.summary;
        }
        totals
    }

    pub fn source(&self, source_type: SourceType) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_type == source_type)
    }
}

pub struct IngestionJob {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    gate: Arc<IngestionGate>,
}

impl IngestionJob {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, gate: Arc<IngestionGate>) -> Self {
        Self { adapters, gate }
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    async fn run_source(&self, adapter: &dyn SourceAdapter, cancel: &CancellationToken) -> SourceReport {
        let mut report = SourceReport {
            source_type: adapter.source_type(),
            name: adapter.name().to_string(),
            fetched: 0,
            normalization_failed: 0,
            summary: IngestionSummary::default(),
            error: None,
            cancelled: false,
        };

        if cancel.is_cancelled() {
            info!(source = adapter.name(), "Run cancelled, source not fetched");
            report.cancelled = true;
            return report;
        }

        let items = match adapter.fetch().await {
            Ok(items) => items,
            Err(e) => {
                error!(
                    source = adapter.name(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Fetch failed, source skipped this run"
                );
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = items.len();

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match adapter.normalize(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(source = adapter.name(), error = %e, "Item could not be normalized");
                    report.normalization_failed += 1;
                }
            }
        }

        report.summary = self.gate.ingest(records, cancel).await;

        info!(
            source = adapter.name(),
            fetched = report.fetched,
            normalization_failed = report.normalization_failed,
            inserted = report.summary.inserted,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "Source ingested"
        );

        report
    }
}

#[async_trait]
impl Job for IngestionJob {
    type Report = IngestionReport;

    fn name(&self) -> &'static str {
        "ingestion"
    }

    async fn run(&self, cancel: CancellationToken) -> protego_common::Result<IngestionReport> {
        let sources = join_all(
            self.adapters
                .iter()
                .map(|adapter| self.run_source(adapter.as_ref(), &cancel)),
        )
        .await;

        Ok(IngestionReport { sources })
    }
}

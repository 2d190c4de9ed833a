//! Pass-scoped walk over unprocessed records
//!
//! Within one pass the selector only moves forward in (scraped_at, id)
//! order, so a record that fails analysis is not selected again until the
//! next pass.

use protego_common::db::Store;
use protego_common::models::{Cursor, ScrapedRecord};
use protego_common::{AnalysisType, StoreResult};
use std::sync::Arc;
use tracing::debug;

pub struct UnprocessedSelector {
    store: Arc<dyn Store>,
    analysis_types: Vec<AnalysisType>,
    batch_size: usize,
    cursor: Option<Cursor>,
}

impl UnprocessedSelector {
    pub fn new(store: Arc<dyn Store>, analysis_types: Vec<AnalysisType>, batch_size: usize) -> Self {
        Self {
            store,
            analysis_types,
            batch_size,
            cursor: None,
        }
    }

    /// Next batch of the current pass; empty once the pass is exhausted
    pub async fn next_batch(&mut self) -> StoreResult<Vec<ScrapedRecord>> {
        let (records, next) = self
            .store
            .select_unprocessed(&self.analysis_types, self.batch_size, self.cursor.as_ref())
            .await?;

        if let Some(next) = next {
            self.cursor = Some(next);
        }
        debug!(selected = records.len(), cursor = ?self.cursor, "Selected unprocessed records");

        Ok(records)
    }

    /// Start a new pass from the oldest record
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn analysis_types(&self) -> &[AnalysisType] {
        &self.analysis_types
    }
}

//! Persistence for scraped records and analysis outputs
//!
//! The pipeline talks to storage only through the [`Store`] trait;
//! [`SqliteStore`] is the production implementation.

pub mod init;
pub mod retry;
pub mod store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AnalysisBatch, AnalysisOutput, AnalysisType, Cursor, NewScrapedRecord, OutputWrite,
    ScrapedRecord, SourceType,
};
use crate::StoreResult;

pub use init::{init_database, init_memory_database};
pub use retry::retry_on_lock;
pub use store::SqliteStore;

/// Storage operations used by the ingestion gate and the analysis engine
///
/// Every call is bounded by the store's query timeout and fails with
/// `StoreError::Timeout` rather than hanging.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_by_external_id(
        &self,
        source_type: SourceType,
        external_id: &str,
    ) -> StoreResult<Option<ScrapedRecord>>;

    /// Insert a new record, failing with `DuplicateKey` if
    /// (source_type, external_id) is already stored
    async fn insert_scraped_record(&self, record: &NewScrapedRecord) -> StoreResult<Uuid>;

    async fn get_scraped_record(&self, id: Uuid) -> StoreResult<Option<ScrapedRecord>>;

    /// Records with no output and no completed pass for any of `analysis_types`,
    /// oldest first, strictly after `cursor`
    ///
    /// Returns the batch and the cursor to continue from (`None` when empty).
    async fn select_unprocessed(
        &self,
        analysis_types: &[AnalysisType],
        batch_size: usize,
        cursor: Option<&Cursor>,
    ) -> StoreResult<(Vec<ScrapedRecord>, Option<Cursor>)>;

    /// Atomically store a record's outputs and mark its strategies complete
    ///
    /// Outputs whose (record, type, keyword) is already stored are skipped.
    /// Fails with `Referential` if the record does not exist.
    async fn insert_analysis_outputs(
        &self,
        scraped_record_id: Uuid,
        batch: &AnalysisBatch,
    ) -> StoreResult<OutputWrite>;

    async fn outputs_for_record(&self, scraped_record_id: Uuid) -> StoreResult<Vec<AnalysisOutput>>;

    async fn count_scraped_records(&self) -> StoreResult<u64>;
}

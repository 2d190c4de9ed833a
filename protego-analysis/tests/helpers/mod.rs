//! Shared fixtures for analysis integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use protego_analysis::{
    AnalysisEngine, AnalysisError, AnalysisJob, AnalysisStrategy, Strategy, UnprocessedSelector,
};
use protego_common::config::AnalysisConfig;
use protego_common::db::{SqliteStore, Store};
use protego_common::events::EventBus;
use protego_common::models::{NewAnalysisOutput, NewScrapedRecord, ScrapedRecord};
use protego_common::{AnalysisType, SourceType};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 10, 8, 0, 0).unwrap()
}

/// Insert a drug label scraped `minutes` after the base time
pub async fn seed(store: &SqliteStore, external_id: &str, minutes: i64, payload: Value) -> Uuid {
    store
        .insert_scraped_record(&NewScrapedRecord {
            source_type: SourceType::FdaDrugLabels,
            external_id: external_id.to_string(),
            title: String::new(),
            link: format!("https://dailymed.test/{}", external_id),
            payload,
            scraped_at: base_time() + Duration::minutes(minutes),
        })
        .await
        .unwrap()
}

pub fn default_strategies() -> Vec<Arc<dyn AnalysisStrategy>> {
    Strategy::from_config(&AnalysisConfig::default())
        .unwrap()
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn AnalysisStrategy>)
        .collect()
}

pub fn engine(
    store: Arc<SqliteStore>,
    strategies: Vec<Arc<dyn AnalysisStrategy>>,
    events: EventBus,
    concurrency: usize,
) -> Arc<AnalysisEngine> {
    Arc::new(AnalysisEngine::new(strategies, store, events, concurrency))
}

pub fn job(store: Arc<SqliteStore>, engine: Arc<AnalysisEngine>, batch_size: usize) -> AnalysisJob {
    let selector = UnprocessedSelector::new(store, engine.analysis_types(), batch_size);
    AnalysisJob::new(engine, selector, EventBus::new(16))
}

/// Keyword strategy that fails for the listed external ids
pub struct FailFor {
    pub external_ids: HashSet<String>,
    pub analysis_type: AnalysisType,
}

impl FailFor {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            external_ids: ids.iter().map(|s| s.to_string()).collect(),
            analysis_type: AnalysisType::KeywordFrequency,
        }
    }

    pub fn as_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }
}

impl AnalysisStrategy for FailFor {
    fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        if self.external_ids.contains(&record.external_id) {
            return Err(AnalysisError::strategy(
                self.analysis_type,
                format!("cannot analyze {}", record.external_id),
            ));
        }
        Ok(vec![NewAnalysisOutput {
            analysis_type: self.analysis_type,
            keyword: "ok".to_string(),
            frequency: 1,
            metadata: json!({}),
        }])
    }
}

/// Keyword strategy that cancels the run as soon as it sees a record
pub struct CancelOnAnalyze(pub CancellationToken);

impl AnalysisStrategy for CancelOnAnalyze {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::KeywordFrequency
    }

    fn analyze(&self, _record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        self.0.cancel();
        Ok(Vec::new())
    }
}

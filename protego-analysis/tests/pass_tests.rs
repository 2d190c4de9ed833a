//! Analysis passes over a populated store

mod helpers;

use helpers::{default_strategies, engine, job, seed, CancelOnAnalyze, FailFor};
use protego_analysis::{AnalysisStrategy, Strategy};
use protego_common::config::AnalysisConfig;
use protego_common::db::{SqliteStore, Store};
use protego_common::events::{EventBus, PipelineEvent};
use protego_common::scheduler::Job;
use protego_common::AnalysisType;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const ALL_DEFAULT: [AnalysisType; 2] = [AnalysisType::KeywordFrequency, AnalysisType::ConditionGrouping];

#[tokio::test]
async fn test_fever_cough_record() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let id = seed(&store, "A1", 0, json!({ "text": "fever fever cough" })).await;
    let engine = engine(store.clone(), default_strategies(), EventBus::new(16), 2);

    let record = store.get_scraped_record(id).await.unwrap().unwrap();
    let write = engine.process(&record).await.unwrap();
    assert_eq!(write.skipped, 0);

    let outputs = store.outputs_for_record(id).await.unwrap();
    let keywords: Vec<_> = outputs
        .iter()
        .filter(|o| o.analysis_type == AnalysisType::KeywordFrequency)
        .map(|o| (o.keyword.as_str(), o.frequency))
        .collect();
    assert_eq!(keywords, vec![("fever", 2), ("cough", 1)]);
    assert!(outputs.iter().all(|o| o.scraped_record_id == id));
    assert!(outputs
        .iter()
        .any(|o| o.analysis_type == AnalysisType::ConditionGrouping && o.keyword == "Fever"));
}

#[tokio::test]
async fn test_failed_record_is_retried_next_pass_only() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed(&store, "R1", 1, json!({})).await;
    let r2 = seed(&store, "R2", 2, json!({})).await;
    seed(&store, "R3", 3, json!({})).await;

    let failing: Vec<Arc<dyn AnalysisStrategy>> = vec![Arc::new(FailFor::new(&["R2"]))];
    let first = job(store.clone(), engine(store.clone(), failing, EventBus::new(16), 1), 1);

    let report = first.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.batches, 3);
    assert!(store.outputs_for_record(r2).await.unwrap().is_empty());

    let (left, _) = store
        .select_unprocessed(&[AnalysisType::KeywordFrequency], 10, None)
        .await
        .unwrap();
    assert_eq!(left.iter().map(|r| r.id).collect::<Vec<_>>(), vec![r2]);

    // A later pass with the fault fixed picks it up
    let fixed: Vec<Arc<dyn AnalysisStrategy>> = vec![Arc::new(FailFor::new(&[]))];
    let second = job(store.clone(), engine(store.clone(), fixed, EventBus::new(16), 1), 10);
    let report = second.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(store.outputs_for_record(r2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_failing_strategy_discards_the_others_outputs() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let id = seed(&store, "A1", 0, json!({ "text": "fever fever cough" })).await;
    let keywords = Strategy::build(AnalysisType::KeywordFrequency, &AnalysisConfig::default()).unwrap();
    let strategies: Vec<Arc<dyn AnalysisStrategy>> = vec![
        Arc::new(keywords),
        Arc::new(FailFor::new(&["A1"]).as_type(AnalysisType::ConditionGrouping)),
    ];
    let engine = engine(store.clone(), strategies, EventBus::new(16), 1);

    let record = store.get_scraped_record(id).await.unwrap().unwrap();
    assert!(engine.analyze(&record).is_err());
    assert!(engine.process(&record).await.is_err());

    assert!(store.outputs_for_record(id).await.unwrap().is_empty());
    let (left, _) = store
        .select_unprocessed(&[AnalysisType::KeywordFrequency], 10, None)
        .await
        .unwrap();
    assert_eq!(left.iter().map(|r| r.id).collect::<Vec<_>>(), vec![id]);
}

#[tokio::test]
async fn test_clean_pass_leaves_nothing_unprocessed() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed(&store, "A1", 0, json!({ "text": "asthma inhaler trial" })).await;
    // Nothing to extract: zero outputs, still counts as processed
    let empty = seed(&store, "A2", 1, json!({})).await;
    for i in 0..7 {
        seed(&store, &format!("B{}", i), 10 + i, json!({ "text": "hypertension" })).await;
    }

    let pass = job(store.clone(), engine(store.clone(), default_strategies(), EventBus::new(64), 3), 4);
    let report = pass.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.processed, 9);
    assert_eq!(report.failed, 0);
    assert_eq!(report.batches, 3);
    assert!(!report.cancelled);

    let (left, cursor) = store.select_unprocessed(&ALL_DEFAULT, 100, None).await.unwrap();
    assert!(left.is_empty());
    assert!(cursor.is_none());
    assert!(store.outputs_for_record(empty).await.unwrap().is_empty());

    // Second pass finds nothing to do
    let again = pass.run(CancellationToken::new()).await.unwrap();
    assert_eq!((again.batches, again.processed), (0, 0));
}

#[tokio::test]
async fn test_reanalysis_does_not_duplicate_outputs() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let id = seed(&store, "A1", 0, json!({ "text": "fever cough pain" })).await;
    let engine = engine(store.clone(), default_strategies(), EventBus::new(16), 1);
    let record = store.get_scraped_record(id).await.unwrap().unwrap();

    let first = engine.process(&record).await.unwrap();
    let before = store.outputs_for_record(id).await.unwrap().len();
    let second = engine.process(&record).await.unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, first.inserted);
    assert_eq!(store.outputs_for_record(id).await.unwrap().len(), before);
}

#[tokio::test]
async fn test_records_processed_oldest_first() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let newest = seed(&store, "N", 30, json!({})).await;
    let oldest = seed(&store, "O", 10, json!({})).await;
    let middle = seed(&store, "M", 20, json!({})).await;

    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let pass = job(store.clone(), engine(store.clone(), default_strategies(), events, 1), 2);
    pass.run(CancellationToken::new()).await.unwrap();

    let mut order = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::RecordAnalyzed { record_id, .. } = event {
            order.push(record_id);
        }
    }
    assert_eq!(order, vec![oldest, middle, newest]);
}

#[tokio::test]
async fn test_cancelled_pass_stops_before_next_record() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed(&store, "A1", 0, json!({ "text": "fever" })).await;

    let pass = job(store.clone(), engine(store.clone(), default_strategies(), EventBus::new(16), 1), 10);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pass.run(cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed, 0);

    let (left, _) = store.select_unprocessed(&ALL_DEFAULT, 10, None).await.unwrap();
    assert_eq!(left.len(), 1);
}

#[tokio::test]
async fn test_cancellation_mid_batch_skips_remaining_records() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let mut records = Vec::new();
    for i in 0..5 {
        let id = seed(&store, &format!("A{}", i), i, json!({ "text": "fever" })).await;
        records.push(store.get_scraped_record(id).await.unwrap().unwrap());
    }

    let cancel = CancellationToken::new();
    let strategies: Vec<Arc<dyn AnalysisStrategy>> = vec![Arc::new(CancelOnAnalyze(cancel.clone()))];
    let engine = engine(store.clone(), strategies, EventBus::new(16), 1);

    let report = engine.process_batch(records, &cancel).await;

    // The record in flight finishes; nothing after it is started
    assert_eq!(report.processed, 1);
    assert_eq!(report.cancelled, 4);
    let (left, _) = store
        .select_unprocessed(&[AnalysisType::KeywordFrequency], 10, None)
        .await
        .unwrap();
    assert_eq!(left.len(), 4);
}

//! Shared fixtures for scraper integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use protego_common::models::NewScrapedRecord;
use protego_common::{time, SourceType};
use protego_scraper::{FetchError, NormalizationError, RawItem, SourceAdapter};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Adapter returning a fixed item list; items need a string `id`
pub struct StaticAdapter {
    pub source_type: SourceType,
    pub items: Vec<Value>,
    pub fail_fetch: bool,
    /// When set, fetch waits for a notification before returning
    pub gate: Option<Notify>,
    pub fetch_started: Notify,
    pub fetches: AtomicUsize,
}

impl StaticAdapter {
    pub fn new(source_type: SourceType, ids: &[&str]) -> Self {
        Self {
            source_type,
            items: ids.iter().map(|id| json!({ "id": id, "text": "fever" })).collect(),
            fail_fetch: false,
            gate: None,
            fetch_started: Notify::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_fetch {
            return Err(FetchError::Status {
                url: "http://static.test".to_string(),
                status: 503,
            });
        }
        Ok(self.items.clone())
    }

    fn normalize(&self, item: RawItem) -> Result<NewScrapedRecord, NormalizationError> {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or(NormalizationError::MissingField("id"))?
            .to_string();

        Ok(NewScrapedRecord {
            source_type: self.source_type,
            title: format!("Item {}", id),
            link: format!("http://static.test/{}", id),
            external_id: id,
            payload: item,
            scraped_at: time::now(),
        })
    }
}

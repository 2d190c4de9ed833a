//! Source adapters
//!
//! Each adapter knows one external source: how to page through it and how to
//! turn one of its entities into a `NewScrapedRecord`. Adapters never touch
//! the store; the ingestion gate decides what gets written.

pub mod clinical_trials;
pub mod dailymed;

use async_trait::async_trait;
use protego_common::config::{NetworkConfig, ScraperConfig};
use protego_common::models::NewScrapedRecord;
use protego_common::SourceType;
use serde_json::Value;
use tracing::debug;

use crate::error::{FetchError, NormalizationError};

pub use clinical_trials::ClinicalTrialsAdapter;
pub use dailymed::DailyMedAdapter;

/// One entity as the source returned it
pub type RawItem = Value;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Retrieve the current batch of entities
    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError>;

    /// Convert one entity; failures affect only that entity
    fn normalize(&self, item: RawItem) -> Result<NewScrapedRecord, NormalizationError>;
}

/// The adapters this build knows about
pub enum Source {
    DailyMed(DailyMedAdapter),
    ClinicalTrials(ClinicalTrialsAdapter),
}

impl Source {
    /// Build every adapter enabled in `scraper`, sharing one HTTP client
    pub fn from_config(
        scraper: &ScraperConfig,
        network: &NetworkConfig,
    ) -> Result<Vec<Source>, FetchError> {
        let client = build_client(network)?;
        let mut sources = Vec::new();

        if scraper.dailymed.enabled {
            sources.push(Source::DailyMed(DailyMedAdapter::new(
                client.clone(),
                &scraper.dailymed,
            )));
        }
        if scraper.clinical_trials.enabled {
            sources.push(Source::ClinicalTrials(ClinicalTrialsAdapter::new(
                client,
                &scraper.clinical_trials,
            )));
        }

        Ok(sources)
    }

    fn adapter(&self) -> &dyn SourceAdapter {
        match self {
            Source::DailyMed(adapter) => adapter,
            Source::ClinicalTrials(adapter) => adapter,
        }
    }
}

#[async_trait]
impl SourceAdapter for Source {
    fn source_type(&self) -> SourceType {
        self.adapter().source_type()
    }

    fn name(&self) -> &str {
        self.adapter().name()
    }

    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        self.adapter().fetch().await
    }

    fn normalize(&self, item: RawItem) -> Result<NewScrapedRecord, NormalizationError> {
        self.adapter().normalize(item)
    }
}

pub fn build_client(network: &NetworkConfig) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(network.user_agent.as_str())
        .timeout(network.timeout())
        .build()
        .map_err(|e| FetchError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GET `url` with `query` and decode the body as JSON
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, FetchError> {
    debug!(url, ?query, "Fetching page");

    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| FetchError::from_reqwest(url, e))?;

    response
        .json::<Value>()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))
}

/// Remove and return the array under `key`, or a decode error naming it
pub(crate) fn take_array(body: &mut Value, key: &str, url: &str) -> Result<Vec<Value>, FetchError> {
    match body.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(FetchError::Decode {
            url: url.to_string(),
            message: format!("response has no '{}' array", key),
        }),
    }
}

/// Non-empty text at a JSON pointer; numbers are accepted and stringified
pub(crate) fn text_at(item: &Value, pointer: &str) -> Option<String> {
    match item.pointer(pointer)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protego_common::config::SourceEndpointConfig;
    use serde_json::json;

    #[test]
    fn test_text_at() {
        let item = json!({ "a": { "b": "  x  " }, "n": 42, "empty": "", "obj": {} });
        assert_eq!(text_at(&item, "/a/b").as_deref(), Some("x"));
        assert_eq!(text_at(&item, "/n").as_deref(), Some("42"));
        assert_eq!(text_at(&item, "/empty"), None);
        assert_eq!(text_at(&item, "/obj"), None);
        assert_eq!(text_at(&item, "/missing"), None);
    }

    #[test]
    fn test_from_config_skips_disabled_sources() {
        let scraper = ScraperConfig {
            dailymed: SourceEndpointConfig {
                enabled: false,
                ..SourceEndpointConfig::default()
            },
            ..ScraperConfig::default()
        };

        let sources = Source::from_config(&scraper, &NetworkConfig::default()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_type(), SourceType::ClinicalTrials);
    }
}

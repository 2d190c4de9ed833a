//! FDA DailyMed drug labels
//!
//! Pages through the SPL listing (`/dailymed/services/v2/spls.json`). Items
//! are keyed by their set id; the drug-names listing shape (no set id, only a
//! name) is keyed by the lower-cased drug name so re-runs stay idempotent.

use async_trait::async_trait;
use protego_common::config::SourceEndpointConfig;
use protego_common::models::NewScrapedRecord;
use protego_common::{time, SourceType};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use super::{get_json, take_array, text_at, RawItem, SourceAdapter};
use crate::error::{FetchError, NormalizationError};

pub const DEFAULT_BASE_URL: &str = "https://dailymed.nlm.nih.gov";

const UNKNOWN_TITLE: &str = "Unknown Drug";

pub struct DailyMedAdapter {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    max_pages: u32,
}

impl DailyMedAdapter {
    pub fn new(client: reqwest::Client, endpoint: &SourceEndpointConfig) -> Self {
        Self {
            client,
            base_url: endpoint.base_url_or(DEFAULT_BASE_URL).to_string(),
            page_size: endpoint.page_size,
            max_pages: endpoint.max_pages,
        }
    }

    fn listing_url(&self) -> String {
        format!("{}/dailymed/services/v2/spls.json", self.base_url)
    }

    fn label_link(&self, set_id: &str) -> String {
        format!("{}/dailymed/drugInfo.cfm?setid={}", self.base_url, set_id)
    }

    fn search_link(&self, drug_name: &str) -> String {
        let search = format!("{}/dailymed/search.cfm", self.base_url);
        Url::parse_with_params(&search, &[("query", drug_name)])
            .map(String::from)
            .unwrap_or(search)
    }
}

/// DailyMed reports page counts as numbers or numeric strings
fn total_pages(body: &Value) -> Option<u64> {
    match body.pointer("/metadata/total_pages")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl SourceAdapter for DailyMedAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::FdaDrugLabels
    }

    fn name(&self) -> &str {
        "DailyMed"
    }

    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        let url = self.listing_url();
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut body = get_json(
                &self.client,
                &url,
                &[
                    ("pagesize", self.page_size.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;

            let total = total_pages(&body).unwrap_or(1);
            let data = take_array(&mut body, "data", &url)?;
            let received = data.len();
            items.extend(data);

            debug!(page, total, received, "DailyMed page fetched");

            if received == 0 || u64::from(page) >= total || page >= self.max_pages {
                break;
            }
            page += 1;
        }

        info!(items = items.len(), pages = page, "Fetched DailyMed labels");
        Ok(items)
    }

    fn normalize(&self, item: RawItem) -> Result<NewScrapedRecord, NormalizationError> {
        if !item.is_object() {
            return Err(NormalizationError::Malformed(
                "drug label item is not an object".to_string(),
            ));
        }

        let drug_name = text_at(&item, "/drug_name");
        let set_id = text_at(&item, "/setid");
        let listing_id = text_at(&item, "/drug_name_id").or_else(|| text_at(&item, "/id"));

        let (external_id, link) = match (&set_id, &listing_id, &drug_name) {
            (Some(set_id), _, _) => (set_id.clone(), self.label_link(set_id)),
            (None, Some(id), name) => (
                id.clone(),
                name.as_deref()
                    .map(|name| self.search_link(name))
                    .unwrap_or_else(|| format!("{}/dailymed/", self.base_url)),
            ),
            (None, None, Some(name)) => (
                format!("name:{}", name.to_lowercase()),
                self.search_link(name),
            ),
            (None, None, None) => return Err(NormalizationError::MissingField("setid")),
        };

        let title = text_at(&item, "/title")
            .or(drug_name)
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        Ok(NewScrapedRecord {
            source_type: SourceType::FdaDrugLabels,
            external_id,
            title,
            link,
            payload: item,
            scraped_at: time::now(),
        })
    }
}

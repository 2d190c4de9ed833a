//! ClinicalTrials.gov studies (API v2)

use async_trait::async_trait;
use protego_common::config::SourceEndpointConfig;
use protego_common::models::NewScrapedRecord;
use protego_common::{time, SourceType};
use serde_json::Value;
use tracing::{debug, info};

use super::{get_json, take_array, text_at, RawItem, SourceAdapter};
use crate::error::{FetchError, NormalizationError};

pub const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";

const STUDY_LINK_BASE: &str = "https://clinicaltrials.gov/study";
const UNKNOWN_TITLE: &str = "Unknown Study";

const NCT_ID: &str = "/protocolSection/identificationModule/nctId";
const OFFICIAL_TITLE: &str = "/protocolSection/identificationModule/officialTitle";
const BRIEF_TITLE: &str = "/protocolSection/identificationModule/briefTitle";

pub struct ClinicalTrialsAdapter {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    max_pages: u32,
}

impl ClinicalTrialsAdapter {
    pub fn new(client: reqwest::Client, endpoint: &SourceEndpointConfig) -> Self {
        Self {
            client,
            base_url: endpoint.base_url_or(DEFAULT_BASE_URL).to_string(),
            page_size: endpoint.page_size,
            max_pages: endpoint.max_pages,
        }
    }
}

#[async_trait]
impl SourceAdapter for ClinicalTrialsAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::ClinicalTrials
    }

    fn name(&self) -> &str {
        "ClinicalTrials.gov"
    }

    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        let url = format!("{}/studies", self.base_url);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        while pages < self.max_pages {
            let mut query = vec![
                ("format", "json".to_string()),
                ("pageSize", self.page_size.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let mut body = get_json(&self.client, &url, &query).await?;
            pages += 1;

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let studies = take_array(&mut body, "studies", &url)?;
            debug!(page = pages, received = studies.len(), "ClinicalTrials.gov page fetched");
            items.extend(studies);

            if page_token.is_none() {
                break;
            }
        }

        info!(items = items.len(), pages, "Fetched ClinicalTrials.gov studies");
        Ok(items)
    }

    fn normalize(&self, item: RawItem) -> Result<NewScrapedRecord, NormalizationError> {
        let nct_id = text_at(&item, NCT_ID).ok_or(NormalizationError::MissingField("nctId"))?;

        let title = text_at(&item, OFFICIAL_TITLE)
            .or_else(|| text_at(&item, BRIEF_TITLE))
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        Ok(NewScrapedRecord {
            source_type: SourceType::ClinicalTrials,
            link: format!("{}/{}", STUDY_LINK_BASE, nct_id),
            external_id: nct_id,
            title,
            payload: item,
            scraped_at: time::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> ClinicalTrialsAdapter {
        ClinicalTrialsAdapter::new(reqwest::Client::new(), &SourceEndpointConfig::default())
    }

    fn study(nct_id: &str, official: Option<&str>, brief: Option<&str>) -> Value {
        let mut ident = json!({ "nctId": nct_id });
        if let Some(t) = official {
            ident["officialTitle"] = json!(t);
        }
        if let Some(t) = brief {
            ident["briefTitle"] = json!(t);
        }
        json!({ "protocolSection": { "identificationModule": ident } })
    }

    #[test]
    fn test_normalize_study() {
        let record = adapter()
            .normalize(study("NCT01234567", Some("A Randomized Trial of X"), Some("X Trial")))
            .unwrap();

        assert_eq!(record.source_type, SourceType::ClinicalTrials);
        assert_eq!(record.external_id, "NCT01234567");
        assert_eq!(record.title, "A Randomized Trial of X");
        assert_eq!(record.link, "https://clinicaltrials.gov/study/NCT01234567");
    }

    #[test]
    fn test_title_fallbacks() {
        assert_eq!(
            adapter().normalize(study("NCT1", None, Some("Brief"))).unwrap().title,
            "Brief"
        );
        assert_eq!(
            adapter().normalize(study("NCT2", None, None)).unwrap().title,
            "Unknown Study"
        );
    }

    #[test]
    fn test_missing_nct_id_is_rejected() {
        let err = adapter()
            .normalize(json!({ "protocolSection": { "identificationModule": { "briefTitle": "x" } } }))
            .unwrap_err();
        assert_eq!(err, NormalizationError::MissingField("nctId"));
    }
}

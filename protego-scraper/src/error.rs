//! Scraper error types

use thiserror::Error;

/// Failure to retrieve items from an external source
///
/// Everything except `Config` is transient: the next scheduled run retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Adapter misconfigured: {0}")]
    Config(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Config(_))
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            FetchError::Decode {
                url,
                message: err.to_string(),
            }
        } else {
            FetchError::Transport {
                url,
                message: err.to_string(),
            }
        }
    }
}

/// A fetched item that cannot become a `NewScrapedRecord`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Malformed item: {0}")]
    Malformed(String),
}

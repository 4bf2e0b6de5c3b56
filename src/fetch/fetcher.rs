//! HTTP fetcher implementation
//!
//! This module provides the binary's concrete operation:
//! - Building the HTTP client from the fetch configuration
//! - GET requests with the configured user agent and timeout
//! - Error classification into recoverable and fatal failures
//! - Field extraction from the returned HTML

use crate::config::FetchConfig;
use crate::engine::{PerformError, Performer};
use crate::fetch::extract::{compile_fields, extract, CompiledField};
use crate::SweepError;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Content stored for a successfully fetched item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContent {
    /// The requested URL
    pub url: String,

    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Extracted text by field name
    pub fields: BTreeMap<String, String>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and extracts the configured fields
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx with every required field | `Ok(PageContent)` |
/// | 2xx missing a required field | `Recoverable` |
/// | Key is not an absolute URL | `Recoverable` |
/// | Non-2xx status | `Recoverable` |
/// | Timeout, connection or body error | `Recoverable` |
pub struct HttpFetcher {
    client: Client,
    fields: Vec<CompiledField>,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Client built and selectors compiled
    /// * `Err(SweepError)` - The client could not be built or a selector is invalid
    pub fn new(config: &FetchConfig) -> Result<Self, SweepError> {
        let client = build_http_client(config)?;
        let fields = compile_fields(&config.fields)?;
        Ok(Self { client, fields })
    }

    async fn fetch(&self, url: &str) -> Result<PageContent, PerformError> {
        let target = Url::parse(url)
            .map_err(|e| PerformError::recoverable(format!("Invalid URL {}: {}", url, e)))?;

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(PerformError::recoverable(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PerformError::recoverable(format!("Failed to read body: {}", e)))?;

        let extraction = extract(&body, &self.fields);
        if !extraction.is_complete() {
            return Err(PerformError::recoverable(format!(
                "required selectors not found: {}",
                extraction.missing_required.join(", ")
            )));
        }

        Ok(PageContent {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            title: extraction.title,
            fields: extraction.fields,
        })
    }
}

impl Performer for HttpFetcher {
    type Content = PageContent;

    async fn perform(&self, key: &str) -> Result<PageContent, PerformError> {
        self.fetch(key).await
    }
}

fn classify_request_error(e: reqwest::Error) -> PerformError {
    if e.is_timeout() {
        PerformError::recoverable("Request timeout")
    } else if e.is_connect() {
        PerformError::recoverable(format!("Connection failed: {}", e))
    } else if e.is_builder() {
        PerformError::recoverable(format!("Invalid request: {}", e))
    } else {
        PerformError::recoverable(e.to_string())
    }
}

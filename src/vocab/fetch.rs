//! Network access for vocabularies and prefix lookups.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

const ACCEPT: &str = "text/turtle, application/trig;q=0.9, application/ld+json;q=0.8, */*;q=0.1";

/// A fetched RDF document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub url: String,
    /// Media type without parameters, when the server sent one.
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Fetches over HTTP(S) with a request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<HttpFetcher, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ldls/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(HttpFetcher { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        debug!(url, "fetching");
        let network_error = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(network_error)?;

        Ok(FetchedDocument {
            url: final_url,
            content_type,
            body,
        })
    }
}

/// Used when network access is disabled; every request fails with [`FetchError::Offline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedDocument, FetchError> {
        Err(FetchError::Offline)
    }
}

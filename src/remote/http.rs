//! HTTP remote source backed by `reqwest`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use super::listing::{parse_listing, resolution_base};
use super::RemoteSource;
use crate::config::SourceConfig;
use crate::error::{MirrorError, Result};
use crate::types::RemoteListing;

/// Remote source that reads an HTML directory listing over HTTP
///
/// Holds one `reqwest::Client`; clone the source (or pass the same client to
/// several sources) to share its connection pool.
#[derive(Clone)]
pub struct HttpRemoteSource {
    client: reqwest::Client,
    listing_url: Url,
    /// Base listing hrefs resolve against
    base: Url,
    listing_timeout: Duration,
    file_timeout: Duration,
}

impl HttpRemoteSource {
    /// Create a source over an existing client
    pub fn new(client: reqwest::Client, config: &SourceConfig) -> Result<Self> {
        let listing_url = Url::parse(&config.listing_url())
            .map_err(|e| MirrorError::Config(format!("invalid listing URL: {}", e)))?;

        Ok(Self {
            client,
            listing_url,
            base: resolution_base(config)?,
            listing_timeout: config.listing_timeout,
            file_timeout: config.file_timeout,
        })
    }

    /// Client with the defaults every source should share
    pub fn build_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("mirrorcast/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MirrorError::Config(format!("failed to build HTTP client: {}", e)))
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    /// GET `url`, failing on transport errors and non-2xx statuses
    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| MirrorError::fetch(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::fetch_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn list_files(&self) -> Result<RemoteListing> {
        let url = self.listing_url.as_str();
        let html = self
            .get(url, self.listing_timeout)
            .await?
            .text()
            .await
            .map_err(|e| MirrorError::fetch(url, &e))?;

        let listing = parse_listing(&html, &self.base);
        tracing::debug!("Listing {} advertised {} files", url, listing.len());
        Ok(listing)
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>> {
        let body = self
            .get(url, self.file_timeout)
            .await?
            .bytes()
            .await
            .map_err(|e| MirrorError::fetch(url, &e))?;
        Ok(body.to_vec())
    }
}

//! Remote document retrieval for catalog and listing files.

use crate::error::CatalogError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetches a text document by URL.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CatalogError>;
}

/// [`DocumentFetcher`] backed by a shared `reqwest` client.
///
/// No retries are attempted; callers decide whether to try again.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with the given connect timeout.
    ///
    /// # Arguments
    ///
    /// * `connect_timeout` - How long to wait for the TCP/TLS connection.
    ///   Catalog hosts can be very slow to accept, so this is usually minutes.
    pub fn new(connect_timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("xdcc-mule/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CatalogError> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

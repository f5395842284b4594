//! Source byte transfer.
//!
//! A fetcher streams one source URL to a caller-chosen temporary path
//! outside the cache root, so an interrupted transfer can never leave
//! partial data inside the cache. Fetchers do not verify checksums;
//! that is the cache's job at promotion time. Retry policy, if any,
//! belongs here and not in the pull engine.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from source transfers. All of these surface as per-source
/// failures in the pull report.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("source {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("io error writing fetched bytes: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Retrieves the bytes behind a source URL into a local temp file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stream `url` to `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        (**self).fetch(url, dest).await
    }
}

/// HTTP fetcher streaming response bodies chunk by chunk.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("datum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        loop {
            let chunk = response.chunk().await.map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(%url, bytes = written, "source fetched");
        Ok(written)
    }
}

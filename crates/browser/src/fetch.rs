//! Page fetching
//!
//! The Conductor only needs "address in, markup out", so fetching sits behind
//! a trait: `HttpFetcher` for the network and local files, `MemoryFetcher`
//! for fixed page sets.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{BrowserError, Result};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the markup at `address`
    async fn fetch(&self, address: &str) -> Result<String>;
}

/// http(s) through reqwest, `file://` through tokio::fs
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fails when the HTTP client cannot be set up (e.g. no TLS backend)
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gaudy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: Url) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_file(&self, url: &Url) -> Result<String> {
        let path = url.to_file_path().map_err(|_| BrowserError::Fetch {
            address: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, address: &str) -> Result<String> {
        let url = Url::parse(address)?;
        tracing::debug!("fetching {}", url);
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => self.fetch_file(&url).await,
            other => Err(BrowserError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Serves pages from a fixed address -> markup table
#[derive(Debug, Default, Clone)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, address: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert(address, html);
        self
    }

    pub fn insert(&mut self, address: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(address.into(), html.into());
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, address: &str) -> Result<String> {
        self.pages
            .get(address)
            .cloned()
            .ok_or_else(|| BrowserError::Fetch {
                address: address.to_string(),
                reason: "no such page".to_string(),
            })
    }
}

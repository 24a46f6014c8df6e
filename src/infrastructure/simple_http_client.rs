//! Lightweight HTTP fetcher for indicator pages
//!
//! Short timeout, browser-like request headers and redirect following. A
//! single attempt per call: when it fails the collector moves on to the
//! browser fetcher instead of retrying here.

use crate::domain::FetchMode;
use crate::infrastructure::collection_error::{CollectionError, CollectionResult};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetching::PageFetcher;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS};
use reqwest::{Client, ClientBuilder, Response};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds, covering connect, redirects and body
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Whether to follow redirects
    pub follow_redirects: bool,
}

impl HttpClientConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_seconds: config.http_timeout_seconds,
            ..Self::default()
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            user_agent: BROWSER_USER_AGENT.to_string(),
            follow_redirects: true,
        }
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pt-BR,pt;q=0.9,en-US;q=0.7,en;q=0.6"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// HTTP client with browser-like headers
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(browser_headers())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Self::with_config(HttpClientConfig::from_app_config(config))
    }

    /// Fetch raw response from a URL, rejecting non-success statuses
    pub async fn fetch_response(&self, url: &str) -> Result<Response> {
        info!("🌐 HTTP GET: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            warn!("❌ HTTP error {}: {}", response.status(), url);
            return Err(anyhow!("HTTP error {}: {}", response.status(), url));
        }

        Ok(response)
    }

    /// Fetch HTML content and return it as a string
    pub async fn fetch_html_string(&self, url: &str) -> Result<String> {
        let response = self.fetch_response(url).await?;

        let html_content = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if html_content.trim().is_empty() {
            return Err(anyhow!("Empty response from {}", url));
        }

        debug!("Fetched {} bytes from {}", html_content.len(), url);
        Ok(html_content)
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    fn mode(&self) -> FetchMode {
        FetchMode::Http
    }

    async fn fetch(&self, url: &str) -> CollectionResult<String> {
        let limit = Duration::from_secs(self.config.timeout_seconds);
        match tokio::time::timeout(limit, self.fetch_html_string(url)).await {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(CollectionError::fetch_failure(FetchMode::Http, url, e)),
            Err(_) => Err(CollectionError::timeout(
                format!("HTTP fetch of {url}"),
                self.config.timeout_seconds,
            )),
        }
    }
}

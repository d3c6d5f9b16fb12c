//! Network side of the worker.
//!
//! The worker never talks to reqwest directly; it goes through [`Fetcher`] so
//! tests (and alternative hosts) can substitute the network.
//!
//! [`HttpFetcher`] follows browser fetch semantics: any HTTP status is a
//! delivered response, only transport failures, timeouts and oversized
//! bodies are errors.

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, parse_request_url, resolve};

use larder_core::{AppConfig, CapturedResponse, Destination, Error, FetchRequest};

/// Source of network responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, Error>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "larder/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "larder/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

fn accept_for(destination: Destination) -> &'static str {
    match destination {
        Destination::Image => "image/avif,image/webp,image/svg+xml,image/*,*/*;q=0.8",
        Destination::Font => "font/woff2,font/woff,*/*;q=0.5",
        Destination::Style => "text/css,*/*;q=0.1",
        Destination::Script => "*/*",
        Destination::Other => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    }
}

fn map_reqwest_error(url: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, Error> {
        let start = Instant::now();
        let url = request.url.as_str();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.clone())
            .header(header::ACCEPT, accept_for(request.destination))
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, &e))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes = response.bytes().await.map_err(|e| map_reqwest_error(url, &e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(CapturedResponse::new(final_url, status.as_u16(), headers, bytes.to_vec()))
    }
}

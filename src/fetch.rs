use crate::config::FETCH_TIMEOUT;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use reqwest::Client;
use scraper::Html;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Retrieves a page and parses it into a navigable document.
///
/// Implementations must apply their own timeout; callers never retry.
/// The returned document is not `Send`, so the trait is used from a
/// single-threaded runtime.
#[async_trait(?Send)]
pub trait DocumentFetcher {
    async fn fetch(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Html, FetchError>;
}

/// Header set that makes search engines serve the regular HTML result page.
pub fn browser_headers() -> HeaderMap {
    let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENTS[index]));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-TW,zh;q=0.9,en;q=0.5"));
    headers
}

/// Headers for forum pages. Some boards answer with an age gate unless the
/// visitor already confirmed it.
pub fn forum_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("over18=1"));
    headers
}

/// Fetch `url`, logging and swallowing any failure.
///
/// `None` tells the caller to back off rather than retry right away.
pub async fn fetch_or_log<F>(fetcher: &F, url: &str, headers: Option<&HeaderMap>) -> Option<Html>
where
    F: DocumentFetcher + ?Sized,
{
    match fetcher.fetch(url, headers).await {
        Ok(document) => Some(document),
        Err(e) => {
            warn!("Error fetching or parsing content from {}: {}", url, e);
            None
        }
    }
}

#[async_trait(?Send)]
impl<T> DocumentFetcher for Arc<T>
where
    T: DocumentFetcher + ?Sized,
{
    async fn fetch(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Html, FetchError> {
        (**self).fetch(url, headers).await
    }
}

/// reqwest-backed fetcher with a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self { client })
    }
}

#[async_trait(?Send)]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Html, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let mut request = self.client.get(parsed);
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }

        let response = request.send().await.map_err(FetchError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Pages are decoded as UTF-8 regardless of the advertised charset.
        let body = response.bytes().await.map_err(FetchError::Body)?;
        let html = String::from_utf8_lossy(&body);
        debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(Html::parse_document(&html))
    }
}

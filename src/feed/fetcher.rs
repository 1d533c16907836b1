use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Descriptive user agent sent with every sitemap request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "sitewatch/",
    env!("CARGO_PKG_VERSION"),
    " (+sitemap change monitor)"
);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Sitemap protocol limit for an uncompressed file
pub const DEFAULT_MAX_SITEMAP_BYTES: usize = 50 * 1024 * 1024;

/// Errors that can occur while retrieving a sitemap.
///
/// All of these are reported on the failed feed only; none of them stop a
/// check pass. The core never retries, callers may.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body (raw or decompressed) exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Gzip stream could not be decoded
    #[error("Decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// HTTP GET capability consumed by the feed manager.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch the raw body of `url`. Non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetch`] implementation over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher with its own client carrying `user_agent`.
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Network)?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    /// Wrap an existing client (caller controls configuration).
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_bytes,
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body chunks of a streamed response. Errors are human-readable messages.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, String>>;

/// Network retrieval capability.
///
/// Every non-success outcome is reported as a message; callers treat it as a
/// terminal failure of the operation that issued the request.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get_stream(&self, url: &str) -> Result<(ByteStream, Option<u64>), String>;

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, String> {
        let (mut stream, total) = self.get_stream(url).await?;
        let mut body = Vec::with_capacity(
            total
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or_default(),
        );
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }

    async fn get_text(&self, url: &str) -> Result<String, String> {
        let body = self.get_bytes(url).await?;
        String::from_utf8(body).map_err(|e| format!("Response from {url} is not UTF-8: {e}"))
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, String> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| format!("Failed to parse JSON from {url}: {e}"))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[source] reqwest::Error);

#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with the given timeouts.
    ///
    /// A read timeout is used instead of a total timeout so large archives can
    /// stream for as long as data keeps arriving.
    ///
    /// # Errors
    /// Returns an error if the TLS backend or client configuration cannot be
    /// initialized.
    pub fn new(options: HttpOptions) -> Result<Self, ClientBuildError> {
        let client = reqwest::Client::builder()
            .read_timeout(options.read_timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(format!("switchyard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientBuildError)?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_stream(&self, url: &str) -> Result<(ByteStream, Option<u64>), String> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request to {url} failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {} for {url}", response.status()));
        }

        let total = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| format!("Download stream error: {e}"))
            })
            .boxed();
        Ok((stream, total))
    }
}

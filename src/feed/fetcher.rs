use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing a feed.
///
/// None of these are fatal to a poll loop: the cycle is skipped and
/// retried at the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The fetch did not complete within the poll loop's bound
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// The dialect translator rejected the parsed feed
    #[error("Translation failed: {0}")]
    Translate(#[from] TranslateError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TranslateError(pub String);

/// One successful fetch: the raw body and its parsed form.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub raw: Vec<u8>,
    pub feed: feed_rs::model::Feed,
}

/// Rewrites a parsed feed for sites whose feeds need fixing up after parsing.
pub trait Translator: Send + Sync {
    fn translate(&self, feed: feed_rs::model::Feed) -> Result<feed_rs::model::Feed, TranslateError>;
}

/// Fetch+parse capability used by a [`Feed`](super::Feed) on every tick.
///
/// Implementations should not retry internally; the poll loop bounds each
/// call with its own timeout and simply tries again on the next tick.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError>;
}

/// Default [`FeedSource`]: HTTP GET followed by `feed-rs` parsing.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    translator: Option<Arc<dyn Translator>>,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            translator: None,
        }
    }

    /// Runs every parsed feed through `translator` before it is returned.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }
}

#[async_trait]
impl FeedSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let raw = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        let mut feed =
            feed_rs::parser::parse(raw.as_slice()).map_err(|e| FetchError::Parse(e.to_string()))?;

        if let Some(translator) = &self.translator {
            feed = translator.translate(feed)?;
        }

        tracing::trace!(
            url = %url,
            bytes = raw.len(),
            entries = feed.entries.len(),
            "Fetched feed"
        );

        Ok(Fetched { raw, feed })
    }
}

/// Reads the body as a stream, failing once it exceeds `limit` bytes.
pub(crate) async fn read_limited_bytes(
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

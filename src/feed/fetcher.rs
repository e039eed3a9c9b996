use crate::feed::parser::{parse_feed, FeedEntry};
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that prevent a feed document from being retrieved at all.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 2xx or 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Conditional-fetch validators returned by the server on a previous fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHints {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheHints {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let header = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let hints = Self {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };
        (!hints.is_empty()).then_some(hints)
    }
}

/// Result of one fetch-and-parse attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Nothing usable came back; there are no hints to carry forward.
    FetchFailed(FetchError),
    /// Content arrived but is malformed. `entries` holds whatever could be
    /// extracted anyway and must never be published.
    ParseFailed {
        reason: String,
        entries: Vec<FeedEntry>,
        hints: Option<CacheHints>,
    },
    /// Well-formed feed. `entries` is empty when the server reported the
    /// content unchanged.
    ParseOk {
        entries: Vec<FeedEntry>,
        hints: Option<CacheHints>,
    },
}

impl FetchOutcome {
    /// Conditional-fetch hints to use on the next attempt.
    pub fn hints(&self) -> Option<&CacheHints> {
        match self {
            FetchOutcome::FetchFailed(_) => None,
            FetchOutcome::ParseFailed { hints, .. } | FetchOutcome::ParseOk { hints, .. } => {
                hints.as_ref()
            }
        }
    }
}

/// Capability to fetch and parse a feed, honoring conditional-fetch hints.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &Url,
        hints: Option<&CacheHints>,
    ) -> impl Future<Output = FetchOutcome> + Send;
}

/// [`FeedSource`] that performs conditional HTTP GETs with `reqwest` and
/// parses the body with `feed-rs`.
///
/// Failures are reported once; there is no retry or backoff. The next
/// scheduled update is the retry.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    timeout: Duration,
    max_feed_size: usize,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_feed_size(mut self, max_feed_size: usize) -> Self {
        self.max_feed_size = max_feed_size;
        self
    }

    async fn fetch_conditional(
        &self,
        url: &Url,
        hints: Option<&CacheHints>,
    ) -> FetchOutcome {
        let mut request = self.client.get(url.as_str());
        if let Some(hints) = hints {
            if let Some(etag) = &hints.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &hints.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return FetchOutcome::FetchFailed(FetchError::Network(e)),
            Err(_) => return FetchOutcome::FetchFailed(FetchError::Timeout),
        };

        let status = response.status();
        let new_hints = CacheHints::from_headers(response.headers());

        if status == reqwest::StatusCode::NOT_MODIFIED {
            tracing::debug!(feed = %url, "Feed not modified (HTTP 304)");
            return FetchOutcome::ParseOk {
                entries: Vec::new(),
                hints: new_hints.or_else(|| hints.cloned()),
            };
        }

        if !status.is_success() {
            return FetchOutcome::FetchFailed(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        let bytes = match tokio::time::timeout(
            self.timeout,
            read_limited_bytes(response, self.max_feed_size),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return FetchOutcome::FetchFailed(e),
            Err(_) => return FetchOutcome::FetchFailed(FetchError::Timeout),
        };

        match parse_feed(&bytes) {
            Err(e) => FetchOutcome::ParseFailed {
                reason: e.to_string(),
                entries: Vec::new(),
                hints: new_hints,
            },
            Ok(entries) => match content_type {
                Some(ct) if !is_feed_content_type(&ct) => FetchOutcome::ParseFailed {
                    reason: format!("Unexpected content type: {ct}"),
                    entries,
                    hints: new_hints,
                },
                _ => FetchOutcome::ParseOk {
                    entries,
                    hints: new_hints,
                },
            },
        }
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &Url, hints: Option<&CacheHints>) -> FetchOutcome {
        self.fetch_conditional(url, hints).await
    }
}

/// Whether a (lowercased) Content-Type is acceptable for a feed document.
///
/// XML and JSON types are fine, as is any `text/*` type except HTML.
fn is_feed_content_type(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    if media_type == "text/html" {
        return false;
    }
    media_type.starts_with("text/") || media_type.contains("xml") || media_type.contains("json")
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    fn feed_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/feed", server.uri())).unwrap()
    }

    fn source() -> HttpFeedSource {
        HttpFeedSource::new(reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_fetch_success_records_hints() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml")
                    .insert_header("ETag", "\"v1\"")
                    .insert_header("Last-Modified", "Mon, 01 Jan 2024 10:00:00 GMT"),
            )
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        match outcome {
            FetchOutcome::ParseOk { entries, hints } => {
                assert_eq!(entries.len(), 1);
                let hints = hints.expect("hints should be recorded");
                assert_eq!(hints.etag.as_deref(), Some("\"v1\""));
                assert_eq!(
                    hints.last_modified.as_deref(),
                    Some("Mon, 01 Jan 2024 10:00:00 GMT")
                );
            }
            other => panic!("Expected ParseOk, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conditional_headers_sent_and_304_keeps_hints() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("If-None-Match", "\"v1\""))
            .and(headers(
                "If-Modified-Since",
                vec!["Mon", "01 Jan 2024 10:00:00 GMT"],
            ))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&mock_server)
            .await;

        let previous = CacheHints {
            etag: Some("\"v1\"".to_string()),
            last_modified: Some("Mon, 01 Jan 2024 10:00:00 GMT".to_string()),
        };
        let outcome = source()
            .fetch(&feed_url(&mock_server), Some(&previous))
            .await;
        match outcome {
            FetchOutcome::ParseOk { entries, hints } => {
                assert!(entries.is_empty());
                assert_eq!(hints, Some(previous));
            }
            other => panic!("Expected ParseOk, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_conditional_headers_without_hints() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        assert!(matches!(outcome, FetchOutcome::ParseOk { hints: None, .. }));

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("if-none-match"));
        assert!(!requests[0].headers.contains_key("if-modified-since"));
    }

    #[tokio::test]
    async fn test_404_is_fetch_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        match outcome {
            FetchOutcome::FetchFailed(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        assert!(matches!(
            outcome,
            FetchOutcome::FetchFailed(FetchError::HttpStatus(500))
        ));
    }

    #[tokio::test]
    async fn test_malformed_feed_is_parse_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<not valid xml")
                    .insert_header("ETag", "\"broken\""),
            )
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        match outcome {
            FetchOutcome::ParseFailed { entries, hints, .. } => {
                assert!(entries.is_empty());
                assert_eq!(hints.and_then(|h| h.etag).as_deref(), Some("\"broken\""));
            }
            other => panic!("Expected ParseFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_html_content_type_is_parse_failure_with_entries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(VALID_RSS, "text/html; charset=utf-8"),
            )
            .mount(&mock_server)
            .await;

        let outcome = source().fetch(&feed_url(&mock_server), None).await;
        match outcome {
            FetchOutcome::ParseFailed {
                reason, entries, ..
            } => {
                assert_eq!(entries.len(), 1);
                assert!(reason.contains("text/html"));
            }
            other => panic!("Expected ParseFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let outcome = source()
            .with_max_feed_size(16)
            .fetch(&feed_url(&mock_server), None)
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::FetchFailed(FetchError::ResponseTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let outcome = source()
            .with_timeout(Duration::from_millis(50))
            .fetch(&feed_url(&mock_server), None)
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::FetchFailed(FetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let url = Url::parse("http://127.0.0.1:9/feed").unwrap();
        let outcome = source().with_timeout(Duration::from_secs(5)).fetch(&url, None).await;
        assert!(matches!(outcome, FetchOutcome::FetchFailed(_)));
    }

    #[test]
    fn test_feed_content_types() {
        assert!(is_feed_content_type("application/rss+xml"));
        assert!(is_feed_content_type("application/atom+xml; charset=utf-8"));
        assert!(is_feed_content_type("text/xml"));
        assert!(is_feed_content_type("text/plain"));
        assert!(is_feed_content_type("application/feed+json"));
        assert!(!is_feed_content_type("text/html"));
        assert!(!is_feed_content_type("text/html; charset=utf-8"));
        assert!(!is_feed_content_type("image/png"));
    }

    #[test]
    fn test_outcome_hints() {
        let hints = CacheHints {
            etag: Some("\"a\"".to_string()),
            last_modified: None,
        };
        let ok = FetchOutcome::ParseOk {
            entries: Vec::new(),
            hints: Some(hints.clone()),
        };
        assert_eq!(ok.hints(), Some(&hints));
        assert_eq!(FetchOutcome::FetchFailed(FetchError::Timeout).hints(), None);
    }
}

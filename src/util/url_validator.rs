use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a configured feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has an empty host component.
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Validates a URL string for use as a feed source.
///
/// Feed URLs come from the operator's own configuration, so only
/// well-formedness is checked: the string must parse, use `http` or `https`,
/// and name a host. Hosts on private networks and localhost are allowed.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - The host is empty ([`UrlValidationError::MissingHost`])
///
/// # Examples
///
/// ```
/// use feedreader::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// assert!(validate_url("not a url").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost(url_str.to_owned())),
    }
}

/// A validated feed URL that remembers the exact string it was configured as.
///
/// Requests go to the parsed [`Url`]. Anything shown to subscribers uses
/// [`FeedUrl::as_str`], which is byte-for-byte what the operator wrote, not
/// the normalized form (`Url` lowercases the host and adds a trailing `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUrl {
    configured: String,
    url: Url,
}

impl FeedUrl {
    /// Validates `configured` with [`validate_url`] and keeps the original text.
    pub fn parse(configured: &str) -> Result<Self, UrlValidationError> {
        let url = validate_url(configured)?;
        Ok(Self {
            configured: configured.to_string(),
            url,
        })
    }

    /// The URL exactly as configured.
    pub fn as_str(&self) -> &str {
        &self.configured
    }

    /// The parsed URL used for fetching.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Display for FeedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.configured)
    }
}

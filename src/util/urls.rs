use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a monitored sitemap.
///
/// Rejects unparsable URLs, schemes other than `http`/`https` (e.g. `file://`)
/// and URLs without a host.
///
/// # Examples
///
/// ```
/// use sitewatch::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/sitemap.xml").is_ok());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Canonical form used for storage-key hashing: lowercase, no trailing slash.
pub fn normalize_for_key(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Host component of `url`, or an empty string when it has none.
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}

/// Resolve a child sitemap reference against the index URL.
///
/// Absolute references are returned unchanged; relative ones are joined to
/// the index's origin, not its directory (`posts.xml` under
/// `/sitemaps/index.xml` becomes `/posts.xml`). Returns `None` when neither
/// interpretation parses.
pub fn resolve_child_url(index_url: &str, child: &str) -> Option<String> {
    if let Ok(abs) = Url::parse(child) {
        return matches!(abs.scheme(), "http" | "https").then(|| child.to_string());
    }

    let mut root = Url::parse(index_url).ok()?;
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root.join(child).ok().map(|u| u.to_string())
}

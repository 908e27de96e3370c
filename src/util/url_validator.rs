use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating an outbound URL.
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

/// Validates a search-engine ping endpoint or feed URL.
///
/// Only absolute `http`/`https` URLs with a host are accepted. Unlike feed
/// sources, ping endpoints may legitimately live on private networks
/// (an internal relay, or a mock server in tests), so addresses are not
/// filtered here.
///
/// # Examples
///
/// ```
/// use sitefeed::util::validate_url;
///
/// let url = validate_url("https://www.example.com/ping?sitemap=").unwrap();
/// assert_eq!(url.host_str(), Some("www.example.com"));
///
/// assert!(validate_url("ftp://example.com").is_err());
/// assert!(validate_url("/relative/path").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Returns true when the URL points at this machine.
///
/// Search engines reject sitemap pings for loopback hosts, so the notifier
/// skips them entirely. Unparseable URLs fall back to a textual check for
/// `localhost`.
pub fn is_loopback_url(url_str: &str) -> bool {
    let Ok(url) = Url::parse(url_str) else {
        return url_str.contains("://localhost");
    };

    let Some(host) = url.host_str() else {
        return false;
    };

    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match host_for_parse.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

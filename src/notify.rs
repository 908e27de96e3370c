//! Best-effort search-engine notification.
//!
//! Each configured endpoint is a URL prefix; the percent-encoded feed URL
//! is appended and the result fetched with a GET. Only the status code is
//! looked at. Failures are logged and reported back, never propagated.

use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::util::{is_loopback_url, validate_url};

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid ping endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Outcome of pinging one endpoint.
#[derive(Debug)]
pub struct PingResult {
    pub endpoint: String,
    /// Response status on success.
    pub result: Result<u16, NotifyError>,
}

/// `endpoint` followed by the percent-encoded `feed_url`.
///
/// ```
/// use sitefeed::notify::ping_url;
///
/// assert_eq!(
///     ping_url("https://engine.example/ping?sitemap=", "http://x/sitemap.xml"),
///     "https://engine.example/ping?sitemap=http%3A%2F%2Fx%2Fsitemap.xml"
/// );
/// ```
pub fn ping_url(endpoint: &str, feed_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(feed_url.as_bytes()).collect();
    format!("{endpoint}{encoded}")
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    endpoints: Vec<String>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(client: reqwest::Client, endpoints: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            timeout,
        }
    }

    /// Builds a notifier with its own HTTP client from the global settings.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitefeed/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(
            client,
            config.search_engines.clone(),
            config.notify_timeout(),
        ))
    }

    /// Pings every endpoint for `feed_url`, sequentially.
    ///
    /// Returns no results when `feed_url` is a loopback address, since
    /// search engines reject those.
    pub async fn notify(&self, feed_url: &str) -> Vec<PingResult> {
        if is_loopback_url(feed_url) {
            tracing::debug!(feed_url = %feed_url, "Loopback feed URL, skipping notification");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let result = self.ping(endpoint, feed_url).await;
            match &result {
                Ok(status) => {
                    tracing::info!(endpoint = %endpoint, status, "Notified search engine")
                }
                Err(NotifyError::HttpStatus(status)) => tracing::error!(
                    endpoint = %endpoint,
                    status,
                    "Cannot submit sitemap to search engine"
                ),
                Err(e) => tracing::warn!(
                    endpoint = %endpoint,
                    error = %e,
                    "Search engine notification failed"
                ),
            }
            results.push(PingResult {
                endpoint: endpoint.clone(),
                result,
            });
        }
        results
    }

    async fn ping(&self, endpoint: &str, feed_url: &str) -> Result<u16, NotifyError> {
        let url = validate_url(&ping_url(endpoint, feed_url)).map_err(|e| {
            NotifyError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))??;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(NotifyError::HttpStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_URL: &str = "http://www.example.com/sitemap.xml";

    fn notifier(endpoints: Vec<String>, timeout: Duration) -> Notifier {
        Notifier::new(reqwest::Client::new(), endpoints, timeout)
    }

    #[tokio::test]
    async fn test_pings_endpoint_with_encoded_feed_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(query_param("sitemap", FEED_URL))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let n = notifier(
            vec![format!("{}/ping?sitemap=", server.uri())],
            Duration::from_secs(5),
        );
        let results = n.notify(FEED_URL).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result.as_ref().unwrap(), &200);
    }

    #[tokio::test]
    async fn test_non_success_is_reported_not_raised() {
        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&failing)
            .await;
        let working = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&working)
            .await;

        let n = notifier(
            vec![
                format!("{}/ping?u=", failing.uri()),
                format!("{}/ping?u=", working.uri()),
            ],
            Duration::from_secs(5),
        );
        let results = n.notify(FEED_URL).await;
        assert!(matches!(results[0].result, Err(NotifyError::HttpStatus(404))));
        assert!(results[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_hanging_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let n = notifier(
            vec![format!("{}/ping?u=", server.uri())],
            Duration::from_millis(100),
        );
        let results = n.notify(FEED_URL).await;
        assert!(matches!(results[0].result, Err(NotifyError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_loopback_feed_url_skips_all_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let n = notifier(vec![format!("{}/ping?u=", server.uri())], Duration::from_secs(5));
        assert!(n.notify("http://localhost/sitemap.xml").await.is_empty());
        assert!(n.notify("http://127.0.0.1:8080/sitemap.xml").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let n = notifier(vec!["not a url ".to_string()], Duration::from_secs(5));
        let results = n.notify(FEED_URL).await;
        assert!(matches!(
            results[0].result,
            Err(NotifyError::InvalidEndpoint { .. })
        ));
    }
}

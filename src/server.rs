//! HTTP surface serving sitemap documents from the feed cache.
//!
//! Every request goes through one fallback handler. A request whose path
//! ends with a configured file name gets that site's document (or the
//! sitemap index) as `text/xml` with status 200, whatever happens during
//! generation. Anything else is 404.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::{Config, SiteConfig};
use crate::engine::FeedEngine;
use crate::feed::{effective_authority, FeedDocument};

/// What a request path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    Site(&'a str),
    Index,
}

fn host_of(headers: &HeaderMap) -> Option<&str> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    // Drop the port
    Some(host.split(':').next().unwrap_or(host))
}

fn authority_host(site: &SiteConfig) -> Option<String> {
    effective_authority(site).map(|authority| {
        let host = authority.split('/').next().unwrap_or(&authority);
        host.split(':').next().unwrap_or(host).to_ascii_lowercase()
    })
}

/// True when the last segments of `path` equal `file_name` (any case).
fn path_matches(path: &str, file_name: &str) -> bool {
    let file_name = file_name.trim_start_matches('/').to_ascii_lowercase();
    if file_name.is_empty() {
        return false;
    }
    let path = path.to_ascii_lowercase();
    path.trim_start_matches('/') == file_name || path.ends_with(&format!("/{file_name}"))
}

/// Picks the document for a request.
///
/// Among sites whose file name matches the path, the one whose host matches
/// the `Host` header wins; otherwise the first configured match is used.
pub fn resolve_target<'a>(config: &'a Config, path: &str, host: Option<&str>) -> Option<Target<'a>> {
    let candidates: Vec<&SiteConfig> = config
        .sites
        .iter()
        .filter(|s| path_matches(path, &s.file_name))
        .collect();

    if let Some(host) = host.map(str::to_ascii_lowercase) {
        if let Some(site) = candidates
            .iter()
            .find(|s| authority_host(s).as_deref() == Some(host.as_str()))
        {
            return Some(Target::Site(&site.name));
        }
    }
    if let Some(site) = candidates.first() {
        return Some(Target::Site(&site.name));
    }

    match &config.index_file_name {
        Some(index) if path_matches(path, index) => Some(Target::Index),
        _ => None,
    }
}

fn xml_response(document: FeedDocument) -> Response {
    let mut response = (StatusCode::OK, document.body.to_string()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", document.digest)) {
        headers.insert(header::ETAG, etag);
    }
    response
}

async fn handle(State(engine): State<Arc<FeedEngine>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path();
    let target = resolve_target(engine.config(), path, host_of(&headers));

    match target {
        Some(Target::Site(site)) => {
            tracing::debug!(site = %site, path = %path, "Serving sitemap");
            xml_response(engine.document_for(site).await)
        }
        Some(Target::Index) => xml_response(engine.index_document().await),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn router(engine: Arc<FeedEngine>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serves until the process is stopped.
pub async fn serve(engine: Arc<FeedEngine>, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Serving sitemaps");
    axum::serve(listener, router(engine)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let site = |name: &str, file: &str, host: &str| SiteConfig {
            name: name.to_string(),
            root_path: "/".to_string(),
            file_name: file.to_string(),
            server_url: Some(host.to_string()),
            ..SiteConfig::default()
        };
        Config {
            index_file_name: Some("sitemap_index.xml".to_string()),
            sites: vec![
                site("en", "sitemap.xml", "http://www.example.com/"),
                site("de", "sitemap.xml", "www.example.de:8443"),
                site("news", "news.xml", "news.example.com"),
            ],
            ..Config::default()
        }
    }

    #[test]
    fn test_resolve_by_file_name_and_host() {
        let config = config();
        assert_eq!(
            resolve_target(&config, "/sitemap.xml", Some("www.example.de")),
            Some(Target::Site("de"))
        );
        assert_eq!(
            resolve_target(&config, "/sitemap.xml", Some("WWW.EXAMPLE.COM")),
            Some(Target::Site("en"))
        );
        assert_eq!(
            resolve_target(&config, "/sitemap.xml", Some("unknown.example")),
            Some(Target::Site("en"))
        );
        assert_eq!(
            resolve_target(&config, "/News.xml", None),
            Some(Target::Site("news"))
        );
    }

    #[test]
    fn test_resolve_index_and_unknown() {
        let config = config();
        assert_eq!(
            resolve_target(&config, "/sitemap_index.xml", None),
            Some(Target::Index)
        );
        assert_eq!(resolve_target(&config, "/about", None), None);
        assert_eq!(resolve_target(&config, "/", None), None);
        assert_eq!(resolve_target(&config, "/mysitemap.xml", None), None);
        assert_eq!(
            resolve_target(&config, "/en/sitemap.xml", None),
            Some(Target::Site("en"))
        );
    }

    #[test]
    fn test_host_header_port_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("www.example.de:8443"));
        assert_eq!(host_of(&headers), Some("www.example.de"));
    }
}

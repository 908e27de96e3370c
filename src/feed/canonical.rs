//! Canonical absolute URLs for content nodes.
//!
//! The content source only knows site-relative links. This module decides
//! the authority (configured server URL, then the site host name, then the
//! platform's own full-URL resolution), assembles the absolute URL and
//! HTML-escapes it for the feed.

use crate::config::SiteConfig;
use crate::content::{ContentNode, ContentSource, LinkOptions};
use crate::feed::SiteError;
use crate::util::html_escape;

/// Removes a leading `http://` or `https://` (any case) from a server URL.
pub fn strip_scheme(server_url: &str) -> &str {
    for scheme in ["http://", "https://"] {
        if server_url.len() >= scheme.len()
            && server_url[..scheme.len()].eq_ignore_ascii_case(scheme)
        {
            return &server_url[scheme.len()..];
        }
    }
    server_url
}

fn is_http_url(url: &str) -> bool {
    strip_scheme(url).len() != url.len()
}

/// For links carrying a non-HTTP scheme marker (`ext://host/path`), the path
/// remainder after the authority. `None` for ordinary relative links.
fn foreign_scheme_remainder(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    Some(rest.find('/').map_or("/", |pos| &rest[pos..]))
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub struct Canonicalizer<'a> {
    source: &'a dyn ContentSource,
    site: &'a SiteConfig,
    links: LinkOptions<'a>,
    authority: Option<String>,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(source: &'a dyn ContentSource, site: &'a SiteConfig) -> Self {
        Self {
            source,
            site,
            links: LinkOptions::for_site(site),
            authority: effective_authority(site),
        }
    }

    /// Host (and optional port/path prefix) canonical URLs are built on.
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Absolute, HTML-escaped URL of `node`.
    ///
    /// # Errors
    ///
    /// [`SiteError::ConfigurationMissing`] when no server URL or host name is
    /// configured and the content source cannot build absolute URLs itself.
    pub fn canonical_url(&self, node: &ContentNode) -> Result<String, SiteError> {
        let relative = self.source.resolve_url(node, &self.links);
        let absolute = self.absolute(&relative)?;
        Ok(html_escape(&absolute).into_owned())
    }

    fn absolute(&self, relative: &str) -> Result<String, SiteError> {
        // Cross-site links already resolve to a full URL
        if is_http_url(relative) {
            return Ok(relative.to_string());
        }

        let path = match foreign_scheme_remainder(relative) {
            Some(remainder) => remainder.to_string(),
            None => with_leading_slash(relative),
        };

        match &self.authority {
            Some(authority) => Ok(format!("{}://{}{}", self.site.scheme, authority, path)),
            None => self
                .source
                .full_url(&path)
                .ok_or_else(|| SiteError::ConfigurationMissing {
                    site: self.site.name.clone(),
                    setting: "server_url".to_string(),
                }),
        }
    }

    /// Public URL of the site's feed document, if an authority is known.
    pub fn feed_url(&self) -> Option<String> {
        let file = self.site.file_name.trim_start_matches('/');
        match &self.authority {
            Some(authority) => Some(format!("{}://{}/{}", self.site.scheme, authority, file)),
            None => self.source.full_url(file),
        }
    }
}

/// Configured server URL (scheme and trailing slashes removed), else the
/// site host name.
pub fn effective_authority(site: &SiteConfig) -> Option<String> {
    let from_server_url = site
        .server_url
        .as_deref()
        .map(|url| strip_scheme(url.trim()).trim_end_matches('/'))
        .filter(|a| !a.is_empty());
    let from_hostname = site
        .hostname
        .as_deref()
        .map(|h| h.trim().trim_end_matches('/'))
        .filter(|h| !h.is_empty());
    from_server_url.or(from_hostname).map(str::to_string)
}

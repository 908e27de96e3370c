use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SiteConfig;
use crate::content::{ContentError, ContentSource, ReadIdentity, ScopedReader};
use crate::feed::assembler::EntryAssembler;
use crate::feed::canonical::Canonicalizer;
use crate::feed::filter::NodeFilter;
use crate::feed::shared::{resolve_mappings, SharedResolver};
use crate::feed::xml::{render_urlset, SerializeError};

/// Failure of one site's generation run. Never affects other sites.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Site '{site}': required setting '{setting}' is missing")]
    ConfigurationMissing { site: String, setting: String },

    #[error("Site '{site}': invalid configuration: {reason}")]
    ConfigurationInvalid { site: String, reason: String },

    #[error("Site '{site}': content root '{path}' not found")]
    NotFound { site: String, path: String },

    #[error("Site '{site}': content source error: {source}")]
    Content {
        site: String,
        #[source]
        source: ContentError,
    },

    #[error("Site '{site}': failed to serialize document: {source}")]
    Serialization {
        site: String,
        #[source]
        source: SerializeError,
    },

    #[error("Site '{site}': failed to write {}: {source}", .path.display())]
    Io {
        site: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Site '{site}': generation task failed: {source}")]
    Task {
        site: String,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Unknown site '{0}'")]
    UnknownSite(String),
}

/// A rendered document and its SHA-256 digest (lower-case hex).
///
/// The body is shared, so cloning out of the cache is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub body: Arc<str>,
    pub digest: String,
}

impl FeedDocument {
    pub fn new(body: String) -> Self {
        let digest = digest_hex(body.as_bytes());
        Self {
            body: Arc::from(body),
            digest,
        }
    }
}

/// SHA-256 of `bytes` as lower-case hex.
pub fn digest_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Result of a successful generation run.
#[derive(Debug, Clone)]
pub struct GeneratedFeed {
    pub site: String,
    pub document: FeedDocument,
    pub entry_count: usize,
    /// Public URL of the document, when an authority is known.
    pub feed_url: Option<String>,
}

/// Runs the whole pipeline for one site.
///
/// Content is read as `identity`. The run is synchronous and touches no
/// shared state.
///
/// # Errors
///
/// Any [`SiteError`]; the caller decides whether to serve a stale or empty
/// document instead.
pub fn generate_site(
    source: &dyn ContentSource,
    identity: &ReadIdentity,
    site: &SiteConfig,
    xmlns: &str,
) -> Result<GeneratedFeed, SiteError> {
    site.validate()?;

    let reader = ScopedReader::new(source, identity.clone());
    let subtree = reader.subtree(site.root_path.trim()).map_err(|e| match e {
        ContentError::NotFound(path) => SiteError::NotFound {
            site: site.name.clone(),
            path,
        },
        other => SiteError::Content {
            site: site.name.clone(),
            source: other,
        },
    })?;

    let filter = NodeFilter::for_site(source, site);
    let canonicalizer = Canonicalizer::new(source, site);
    tracing::debug!(
        site = %site.name,
        selection = ?filter.selection(),
        authority = canonicalizer.authority().unwrap_or("<platform>"),
        "Walking content tree"
    );

    let mut walk = Vec::with_capacity(subtree.descendants.len() + 1);
    walk.push(subtree.root);
    walk.extend(subtree.descendants);
    let primary = filter.retain(walk);

    let mappings = resolve_mappings(&reader, site);
    let shared = SharedResolver::new(&reader, &canonicalizer, &filter, site.cleanup_bucket_path)
        .resolve(&mappings)?;

    let assembler = EntryAssembler::new(&canonicalizer, &site.fields, site.effective_limit());
    let entries = assembler.assemble(&primary, shared)?;

    let body = render_urlset(xmlns, &entries).map_err(|source| SiteError::Serialization {
        site: site.name.clone(),
        source,
    })?;

    tracing::info!(
        site = %site.name,
        entries = entries.len(),
        bytes = body.len(),
        "Generated sitemap"
    );

    Ok(GeneratedFeed {
        site: site.name.clone(),
        document: FeedDocument::new(body),
        entry_count: entries.len(),
        feed_url: canonicalizer.feed_url(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SharedContentConfig, DEFAULT_XMLNS};
    use crate::content::{MemoryRepository, NodeRecord};
    use crate::feed::xml::parse_urlset;

    fn repo() -> MemoryRepository {
        MemoryRepository::from_records(vec![
            NodeRecord::new("home", "/content/home")
                .template("Page")
                .field("Priority", "1.0"),
            NodeRecord::new("about", "/content/home/about").template("Page"),
            NodeRecord::new("private", "/content/home/members")
                .template("Page")
                .read_roles(["member"]),
            NodeRecord::new("hidden", "/content/home/hidden")
                .template("Page")
                .field("Exclude", "true"),
            NodeRecord::new("news", "/content/home/news").template("Page"),
            NodeRecord::new("shared", "/content/shared").template("Folder"),
            NodeRecord::new("story", "/content/shared/story").template("Page"),
        ])
        .unwrap()
    }

    fn site() -> SiteConfig {
        SiteConfig {
            name: "web".to_string(),
            root_path: "/content/home".to_string(),
            server_url: Some("www.example.com".to_string()),
            enabled_templates: ["Page"].map(String::from).into(),
            exclusion_field: Some("Exclude".to_string()),
            ..SiteConfig::default()
        }
    }

    fn anon() -> ReadIdentity {
        ReadIdentity::new("anon")
    }

    fn locations(feed: &GeneratedFeed) -> Vec<String> {
        parse_urlset(&feed.document.body)
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.location)
            .collect()
    }

    #[test]
    fn test_generate_site_end_to_end() {
        let repo = repo();
        let mut site = site();
        site.shared_content.push(SharedContentConfig {
            content_location: "/content/shared".to_string(),
            parent_item: "/content/home/news".to_string(),
        });
        let feed = generate_site(&repo, &anon(), &site, DEFAULT_XMLNS).unwrap();

        assert_eq!(feed.entry_count, 4);
        assert_eq!(
            locations(&feed),
            vec![
                "http://www.example.com/",
                "http://www.example.com/about",
                "http://www.example.com/news",
                "http://www.example.com/news/story",
            ]
        );
        assert_eq!(
            feed.feed_url.as_deref(),
            Some("http://www.example.com/sitemap.xml")
        );
        assert_eq!(feed.document.digest.len(), 64);
    }

    #[test]
    fn test_identity_controls_visibility() {
        let repo = repo();
        let member = generate_site(&repo, &ReadIdentity::new("member"), &site(), DEFAULT_XMLNS)
            .unwrap();
        assert!(locations(&member).contains(&"http://www.example.com/members".to_string()));

        let anon = generate_site(&repo, &anon(), &site(), DEFAULT_XMLNS).unwrap();
        assert!(!locations(&anon).contains(&"http://www.example.com/members".to_string()));
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let mut site = site();
        site.root_path = "/content/gone".to_string();
        let err = generate_site(&repo(), &anon(), &site, DEFAULT_XMLNS).unwrap_err();
        assert!(matches!(err, SiteError::NotFound { path, .. } if path == "/content/gone"));
    }

    #[test]
    fn test_invalid_configuration_rejected_before_reading() {
        let mut site = site();
        site.excluded_items.insert("hidden".to_string());
        let err = generate_site(&repo(), &anon(), &site, DEFAULT_XMLNS).unwrap_err();
        assert!(matches!(err, SiteError::ConfigurationInvalid { .. }));
    }

    #[test]
    fn test_limit_applies() {
        let mut site = site();
        site.url_limit = 1;
        let feed = generate_site(&repo(), &anon(), &site, DEFAULT_XMLNS).unwrap();
        assert_eq!(locations(&feed), vec!["http://www.example.com/"]);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = FeedDocument::new("abc".to_string());
        assert_eq!(
            a.digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(a, FeedDocument::new("abc".to_string()));
    }
}

//! Republishing of shared content under a different public path.
//!
//! A site may pull in descendants of a shared area (`content_location`) and
//! publish them below one of its own items (`parent_item`). Two rebasing
//! modes exist:
//!
//! - **leaf** (`cleanup_bucket_path = true`): only the node's last URL
//!   segment is kept, for content physically moved into a bucket
//! - **suffix**: the node's URL relative to its containing shared location
//!   is appended to the parent item's URL

use crate::config::SiteConfig;
use crate::content::{ContentError, ContentNode, ScopedReader};
use crate::feed::canonical::Canonicalizer;
use crate::feed::filter::NodeFilter;
use crate::feed::SiteError;
use crate::util::join_url;

/// How descendants of a shared location are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescendantStrategy {
    /// Walk the tree below the location.
    Direct,
    /// Query the search index scoped to the location (buckets).
    Indexed,
}

impl DescendantStrategy {
    pub fn for_location(reader: &ScopedReader<'_>, location: &ContentNode) -> Self {
        if reader.source().supports_indexed_query(location) {
            DescendantStrategy::Indexed
        } else {
            DescendantStrategy::Direct
        }
    }

    pub fn fetch(self, reader: &ScopedReader<'_>, location: &ContentNode) -> Vec<ContentNode> {
        match self {
            DescendantStrategy::Direct => reader.descendants(location),
            DescendantStrategy::Indexed => reader.indexed_descendants(location),
        }
    }
}

/// A shared-content definition with both ends resolved to content nodes.
#[derive(Debug, Clone)]
pub struct SharedMapping {
    pub content_location: ContentNode,
    pub parent_item: ContentNode,
    pub strategy: DescendantStrategy,
}

/// Resolves the site's shared-content definitions.
///
/// Definitions whose paths do not resolve for the reading identity are
/// skipped with a warning; the rest of the site is still generated.
pub fn resolve_mappings(reader: &ScopedReader<'_>, site: &SiteConfig) -> Vec<SharedMapping> {
    let mut mappings = Vec::new();
    for definition in site.complete_shared_content() {
        let resolved = reader
            .item(definition.content_location.trim())
            .and_then(|location| {
                let parent = reader.item(definition.parent_item.trim())?;
                Ok((location, parent))
            });

        match resolved {
            Ok((content_location, parent_item)) => {
                let strategy = DescendantStrategy::for_location(reader, &content_location);
                mappings.push(SharedMapping {
                    content_location,
                    parent_item,
                    strategy,
                });
            }
            Err(ContentError::NotFound(path)) => {
                tracing::warn!(
                    site = %site.name,
                    path = %path,
                    "Shared content item not found, skipping definition"
                );
            }
            Err(e) => {
                tracing::warn!(
                    site = %site.name,
                    error = %e,
                    "Failed to resolve shared content definition, skipping"
                );
            }
        }
    }
    mappings
}

/// An eligible shared node and the public location it is republished at.
#[derive(Debug, Clone)]
pub struct SharedEntry {
    pub node: ContentNode,
    pub location: String,
}

/// Keeps only the leaf segment of `node_url` and appends it to `parent_url`.
///
/// ```
/// use sitefeed::feed::rebase_leaf;
///
/// assert_eq!(
///     rebase_leaf("http://x/shared/news/a/b", "http://x/site/news"),
///     "http://x/site/news/b"
/// );
/// ```
pub fn rebase_leaf(node_url: &str, parent_url: &str) -> String {
    let trimmed = node_url.trim_end_matches('/');
    let leaf = trimmed.rsplit('/').next().unwrap_or(trimmed);
    join_url(parent_url, leaf)
}

/// Moves `node_url` from below `location_url` to below `parent_url`.
///
/// Returns `None` when `node_url` does not start with `location_url`.
///
/// ```
/// use sitefeed::feed::rebase_suffix;
///
/// assert_eq!(
///     rebase_suffix("http://x/shared/news/a/b", "http://x/shared/news", "http://x/site/news/"),
///     Some("http://x/site/news/a/b".to_string())
/// );
/// ```
pub fn rebase_suffix(node_url: &str, location_url: &str, parent_url: &str) -> Option<String> {
    let prefix = location_url.trim_end_matches('/');
    let remainder = node_url.strip_prefix(prefix)?;
    // The prefix must end on a segment boundary
    if !(remainder.is_empty() || remainder.starts_with('/')) {
        return None;
    }
    Some(join_url(parent_url, remainder))
}

struct MappingUrls {
    location: String,
    parent: String,
}

/// Collects the shared entries of one site.
pub struct SharedResolver<'a> {
    reader: &'a ScopedReader<'a>,
    canonicalizer: &'a Canonicalizer<'a>,
    filter: &'a NodeFilter<'a>,
    cleanup_bucket_path: bool,
}

impl<'a> SharedResolver<'a> {
    pub fn new(
        reader: &'a ScopedReader<'a>,
        canonicalizer: &'a Canonicalizer<'a>,
        filter: &'a NodeFilter<'a>,
        cleanup_bucket_path: bool,
    ) -> Self {
        Self {
            reader,
            canonicalizer,
            filter,
            cleanup_bucket_path,
        }
    }

    /// Fetches, filters and rebases the descendants of every mapping.
    ///
    /// # Errors
    ///
    /// Only canonicalization failures, which are fatal for the site.
    pub fn resolve(&self, mappings: &[SharedMapping]) -> Result<Vec<SharedEntry>, SiteError> {
        let urls = mappings
            .iter()
            .map(|m| {
                Ok(MappingUrls {
                    location: self.canonicalizer.canonical_url(&m.content_location)?,
                    parent: self.canonicalizer.canonical_url(&m.parent_item)?,
                })
            })
            .collect::<Result<Vec<_>, SiteError>>()?;

        let mut entries = Vec::new();
        for (mapping, mapping_urls) in mappings.iter().zip(&urls) {
            let candidates = mapping.strategy.fetch(self.reader, &mapping.content_location);
            let eligible = self.filter.retain(candidates);
            tracing::debug!(
                location = %mapping.content_location.path,
                strategy = ?mapping.strategy,
                eligible = eligible.len(),
                "Collected shared content"
            );

            for node in eligible {
                let node_url = self.canonicalizer.canonical_url(&node)?;
                let location = if self.cleanup_bucket_path {
                    Some(rebase_leaf(&node_url, &mapping_urls.parent))
                } else {
                    self.rebase_by_container(&node, &node_url, mappings, &urls)
                };

                match location {
                    Some(location) => entries.push(SharedEntry { node, location }),
                    None => tracing::debug!(
                        path = %node.path,
                        "No containing shared location, dropping node"
                    ),
                }
            }
        }
        Ok(entries)
    }

    /// Suffix rebasing onto the parent of the first mapping whose location
    /// contains `node`.
    fn rebase_by_container(
        &self,
        node: &ContentNode,
        node_url: &str,
        mappings: &[SharedMapping],
        urls: &[MappingUrls],
    ) -> Option<String> {
        let source = self.reader.source();
        let (_, container) = mappings
            .iter()
            .zip(urls)
            .find(|(m, _)| source.is_ancestor_of(&m.content_location, node))?;
        rebase_suffix(node_url, &container.location, &container.parent)
    }
}

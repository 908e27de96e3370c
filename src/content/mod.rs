//! Read-only view over the hierarchical content repository.
//!
//! The engine never talks to a repository directly. Everything it needs is
//! expressed by the [`ContentSource`] trait:
//!
//! - item lookup by path and tree descent, always under an explicit
//!   [`ReadIdentity`]
//! - an optional indexed descendant query for large collections ("buckets")
//! - site-relative link resolution and layout presence
//!
//! Reads are performed through a [`ScopedReader`], which pins the identity for
//! the duration of a generation run so the feed only reflects what that
//! identity can see, regardless of who triggered the run.
//!
//! [`MemoryRepository`] is the bundled implementation, backed by a JSON
//! snapshot of the tree.

mod memory;

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::config::{FieldNames, SiteConfig};

pub use memory::{MemoryRepository, NodeRecord};

#[derive(Debug, Error)]
pub enum ContentError {
    /// The path does not resolve to an item visible to the reading identity.
    #[error("Content item not found: {0}")]
    NotFound(String),

    #[error("Failed to read content snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid content snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Inconsistent content snapshot: {0}")]
    Snapshot(String),
}

/// Known content fields read by the engine.
///
/// The concrete field name for each is configurable per site through
/// [`FieldNames`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Priority,
    ChangeFrequency,
}

/// Immutable snapshot of one item in the content tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    pub id: String,
    pub path: String,
    pub template_id: Option<String>,
    pub updated: DateTime<FixedOffset>,
    fields: BTreeMap<String, String>,
}

impl ContentNode {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        template_id: Option<String>,
        updated: DateTime<FixedOffset>,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            template_id,
            updated,
            fields,
        }
    }

    /// Raw field lookup. Blank values read as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Lookup of a known field through the site's field-name mapping.
    pub fn known_field(&self, field: Field, names: &FieldNames) -> Option<&str> {
        self.field(names.name_of(field))
    }
}

/// Security identity the content tree is read as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadIdentity(String);

impl ReadIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options for resolving an item's site-relative URL.
#[derive(Debug, Clone)]
pub struct LinkOptions<'a> {
    /// Items under this path resolve relative to it.
    pub site_root: &'a str,
    pub lowercase: bool,
}

impl<'a> LinkOptions<'a> {
    pub fn for_site(site: &'a SiteConfig) -> Self {
        Self {
            site_root: &site.root_path,
            lowercase: site.lowercase_urls,
        }
    }
}

/// An item together with all of its visible descendants.
#[derive(Debug, Clone)]
pub struct Subtree {
    pub root: ContentNode,
    pub descendants: Vec<ContentNode>,
}

/// Contract between the engine and a content repository.
///
/// Implementations must be safe to share between concurrent generation runs.
pub trait ContentSource: Send + Sync {
    /// Looks up an item by path as seen by `identity`.
    fn item(&self, path: &str, identity: &ReadIdentity) -> Result<ContentNode, ContentError>;

    /// All descendants of `node` visible to `identity`, in tree order.
    fn descendants(&self, node: &ContentNode, identity: &ReadIdentity) -> Vec<ContentNode>;

    /// Whether descendants of `node` should be fetched with an indexed query
    /// rather than by walking the tree.
    fn supports_indexed_query(&self, _node: &ContentNode) -> bool {
        false
    }

    /// Descendants of `node` from the search index, excluding `node` itself.
    fn indexed_descendants(&self, node: &ContentNode, identity: &ReadIdentity) -> Vec<ContentNode> {
        self.descendants(node, identity)
    }

    fn is_ancestor_of(&self, ancestor: &ContentNode, node: &ContentNode) -> bool {
        ancestor.id != node.id && is_path_within(&node.path, &ancestor.path)
    }

    /// Site-relative URL of `node`.
    fn resolve_url(&self, node: &ContentNode, options: &LinkOptions<'_>) -> String;

    /// Whether `node` renders a layout on `device`.
    fn has_layout(&self, node: &ContentNode, device: &str) -> bool;

    /// Platform fallback turning a relative URL into an absolute one.
    fn full_url(&self, _relative: &str) -> Option<String> {
        None
    }
}

/// Reads a [`ContentSource`] as a fixed identity.
///
/// The identity is held by the reader, not by the source, so concurrent runs
/// with different identities never observe each other's setting and nothing
/// needs restoring when the reader is dropped.
pub struct ScopedReader<'a> {
    source: &'a dyn ContentSource,
    identity: ReadIdentity,
}

impl<'a> ScopedReader<'a> {
    pub fn new(source: &'a dyn ContentSource, identity: ReadIdentity) -> Self {
        tracing::trace!(identity = %identity, "Opening scoped content reader");
        Self { source, identity }
    }

    pub fn source(&self) -> &'a dyn ContentSource {
        self.source
    }

    pub fn item(&self, path: &str) -> Result<ContentNode, ContentError> {
        self.source.item(path, &self.identity)
    }

    /// Fetches `root_path` and everything below it.
    ///
    /// # Errors
    ///
    /// [`ContentError::NotFound`] when the root does not resolve.
    pub fn subtree(&self, root_path: &str) -> Result<Subtree, ContentError> {
        let root = self.item(root_path)?;
        let descendants = self.source.descendants(&root, &self.identity);
        Ok(Subtree { root, descendants })
    }

    pub fn descendants(&self, node: &ContentNode) -> Vec<ContentNode> {
        self.source.descendants(node, &self.identity)
    }

    pub fn indexed_descendants(&self, node: &ContentNode) -> Vec<ContentNode> {
        self.source.indexed_descendants(node, &self.identity)
    }
}

/// Returns true when `path` is `ancestor` or lies below it.
///
/// Comparison is segment-aware (`/news` does not contain `/newsletters`) and
/// case-insensitive, like item paths in the repository.
pub fn is_path_within(path: &str, ancestor: &str) -> bool {
    let path = normalize_path(path);
    let ancestor = normalize_path(ancestor);
    if ancestor.is_empty() || ancestor == "/" {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(&ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Lower-cased path without trailing slashes.
pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        return "/".to_string();
    }
    trimmed.to_lowercase()
}

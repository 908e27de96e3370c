use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::{
    is_path_within, normalize_path, ContentError, ContentNode, ContentSource, LinkOptions,
    ReadIdentity,
};

/// One item as stored in a content snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub template: Option<String>,
    pub updated: DateTime<FixedOffset>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Devices this item renders a layout for.
    #[serde(default)]
    pub layouts: Vec<String>,
    /// Large collection served by the search index.
    #[serde(default)]
    pub bucket: bool,
    /// Identities allowed to read this item and everything below it.
    /// `None` means readable by everyone.
    #[serde(default)]
    pub read_roles: Option<Vec<String>>,
    /// Pre-resolved link, e.g. an external-link item.
    #[serde(default)]
    pub link: Option<String>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            template: None,
            // Fixed default so snapshots built in code render deterministically
            updated: DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00")
                .unwrap_or_default(),
            fields: BTreeMap::new(),
            layouts: Vec::new(),
            bucket: false,
            read_roles: None,
            link: None,
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn updated(mut self, updated: DateTime<FixedOffset>) -> Self {
        self.updated = updated;
        self
    }

    pub fn layout(mut self, device: impl Into<String>) -> Self {
        self.layouts.push(device.into());
        self
    }

    pub fn bucket(mut self) -> Self {
        self.bucket = true;
        self
    }

    pub fn read_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    fn to_node(&self) -> ContentNode {
        ContentNode::new(
            self.id.clone(),
            trim_path(&self.path),
            self.template.clone(),
            self.updated,
            self.fields.clone(),
        )
    }

    fn readable_by(&self, identity: &ReadIdentity) -> bool {
        match &self.read_roles {
            None => true,
            Some(roles) => roles.iter().any(|r| r == identity.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    base_url: Option<String>,
    nodes: Vec<NodeRecord>,
}

/// Content source backed by an in-memory snapshot of the tree.
///
/// Children keep the order in which they appear in the snapshot; a tree
/// walk is a depth-first pre-order traversal. Paths are matched
/// case-insensitively.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    base_url: Option<String>,
    records: Vec<NodeRecord>,
    by_path: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
}

impl MemoryRepository {
    /// Loads a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let content = std::fs::read_to_string(path)?;
        let repo = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            nodes = repo.records.len(),
            "Loaded content snapshot"
        );
        Ok(repo)
    }

    pub fn from_json(content: &str) -> Result<Self, ContentError> {
        let snapshot: Snapshot = serde_json::from_str(content)?;
        Self::build(snapshot.base_url, snapshot.nodes)
    }

    /// Builds a repository from records.
    ///
    /// # Errors
    ///
    /// [`ContentError::Snapshot`] on duplicate ids or paths.
    pub fn from_records(records: Vec<NodeRecord>) -> Result<Self, ContentError> {
        Self::build(None, records)
    }

    /// Absolute base used by [`ContentSource::full_url`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn build(base_url: Option<String>, records: Vec<NodeRecord>) -> Result<Self, ContentError> {
        let mut by_path = HashMap::with_capacity(records.len());
        let mut ids = HashMap::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            let key = normalize_path(&record.path);
            if !key.starts_with('/') {
                return Err(ContentError::Snapshot(format!(
                    "path '{}' is not absolute",
                    record.path
                )));
            }
            if by_path.insert(key, idx).is_some() {
                return Err(ContentError::Snapshot(format!(
                    "duplicate path '{}'",
                    record.path
                )));
            }
            if ids.insert(record.id.as_str(), idx).is_some() {
                return Err(ContentError::Snapshot(format!(
                    "duplicate id '{}'",
                    record.id
                )));
            }
        }

        // Attach every record to its nearest existing ancestor so gaps in
        // the snapshot do not orphan subtrees.
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            if let Some(parent) = nearest_ancestor(&by_path, &normalize_path(&record.path)) {
                children.entry(parent).or_default().push(idx);
            }
        }

        Ok(Self {
            base_url,
            records,
            by_path,
            children,
        })
    }

    fn record_for(&self, node: &ContentNode) -> Option<&NodeRecord> {
        self.by_path
            .get(&normalize_path(&node.path))
            .map(|&idx| &self.records[idx])
    }

    /// An item is visible when it and every stored ancestor admit `identity`.
    fn is_visible(&self, key: &str, identity: &ReadIdentity) -> bool {
        let mut current = key;
        loop {
            if let Some(&idx) = self.by_path.get(current) {
                if !self.records[idx].readable_by(identity) {
                    return false;
                }
            }
            if current == "/" {
                return true;
            }
            current = match current.rfind('/') {
                Some(0) => "/",
                Some(pos) => &current[..pos],
                None => return true,
            };
        }
    }

    fn walk(&self, key: &str, identity: &ReadIdentity, out: &mut Vec<ContentNode>) {
        let Some(children) = self.children.get(key) else {
            return;
        };
        for &idx in children {
            let record = &self.records[idx];
            // Unreadable items hide their whole subtree
            if !record.readable_by(identity) {
                continue;
            }
            out.push(record.to_node());
            self.walk(&normalize_path(&record.path), identity, out);
        }
    }
}

/// Drops trailing slashes but keeps the repository root as `/`.
fn trim_path(path: &str) -> String {
    match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Remainder of `path` below `root`, counted in segments.
///
/// Roots are matched case-insensitively, and lower-casing can change a
/// segment's byte length, so the remainder is never cut at a byte offset.
fn relative_to_root(path: &str, root: &str) -> String {
    let depth = root.split('/').filter(|s| !s.is_empty()).count();
    let rest: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(depth)
        .collect();
    if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    }
}

fn nearest_ancestor(by_path: &HashMap<String, usize>, key: &str) -> Option<String> {
    let mut current = key;
    while let Some(pos) = current.rfind('/') {
        if pos == 0 {
            return by_path.contains_key("/").then(|| "/".to_string()).filter(|_| key != "/");
        }
        current = &current[..pos];
        if by_path.contains_key(current) {
            return Some(current.to_string());
        }
    }
    None
}

impl ContentSource for MemoryRepository {
    fn item(&self, path: &str, identity: &ReadIdentity) -> Result<ContentNode, ContentError> {
        let key = normalize_path(path);
        match self.by_path.get(&key) {
            Some(&idx) if self.is_visible(&key, identity) => Ok(self.records[idx].to_node()),
            _ => Err(ContentError::NotFound(path.to_string())),
        }
    }

    fn descendants(&self, node: &ContentNode, identity: &ReadIdentity) -> Vec<ContentNode> {
        let mut out = Vec::new();
        self.walk(&normalize_path(&node.path), identity, &mut out);
        out
    }

    fn supports_indexed_query(&self, node: &ContentNode) -> bool {
        self.record_for(node).is_some_and(|r| r.bucket)
    }

    /// Index results come back ordered by path, as a path-sorted index
    /// query would return them.
    fn indexed_descendants(&self, node: &ContentNode, identity: &ReadIdentity) -> Vec<ContentNode> {
        let root = normalize_path(&node.path);
        let mut hits: Vec<(String, &NodeRecord)> = self
            .by_path
            .iter()
            .filter(|(key, _)| **key != root && is_path_within(key, &root))
            .filter(|(key, _)| self.is_visible(key, identity))
            .map(|(key, &idx)| (key.clone(), &self.records[idx]))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.into_iter().map(|(_, r)| r.to_node()).collect()
    }

    fn resolve_url(&self, node: &ContentNode, options: &LinkOptions<'_>) -> String {
        let url = match self.record_for(node).and_then(|r| r.link.clone()) {
            Some(link) => link,
            None => {
                let path = node.path.trim_end_matches('/');
                if is_path_within(path, options.site_root) {
                    relative_to_root(path, options.site_root)
                } else {
                    path.to_string()
                }
            }
        };

        if options.lowercase {
            url.to_lowercase()
        } else {
            url
        }
    }

    fn has_layout(&self, node: &ContentNode, device: &str) -> bool {
        self.record_for(node)
            .is_some_and(|r| r.layouts.iter().any(|d| d.eq_ignore_ascii_case(device)))
    }

    fn full_url(&self, relative: &str) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            relative.trim_start_matches('/')
        ))
    }
}

use std::collections::BTreeSet;

use crate::config::SiteConfig;
use crate::content::{ContentNode, ContentSource};
use crate::util::is_truthy;

/// How excluded items are recognised.
#[derive(Debug, Clone, Copy)]
pub enum Exclusion<'a> {
    /// Legacy: a configured list of item identifiers.
    Items(&'a BTreeSet<String>),
    /// Modern: a checkbox field on the item itself.
    Flag(&'a str),
}

impl<'a> Exclusion<'a> {
    pub fn for_site(site: &'a SiteConfig) -> Self {
        match site.exclusion_field.as_deref() {
            Some(field) => Exclusion::Flag(field),
            None => Exclusion::Items(&site.excluded_items),
        }
    }

    pub fn excludes(&self, node: &ContentNode) -> bool {
        match self {
            Exclusion::Items(ids) => ids.contains(&node.id),
            Exclusion::Flag(field) => node.field(field).is_some_and(is_truthy),
        }
    }
}

/// Which nodes are candidates before exclusion is applied.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    /// Node template must be one of the enabled templates.
    AllowList(&'a BTreeSet<String>),
    /// No templates configured: node must render a layout on the device.
    LayoutPresence { device: &'a str },
}

impl<'a> Selection<'a> {
    pub fn for_site(site: &'a SiteConfig) -> Self {
        if site.enabled_templates.is_empty() {
            Selection::LayoutPresence {
                device: &site.device,
            }
        } else {
            Selection::AllowList(&site.enabled_templates)
        }
    }
}

/// Decides which content nodes may appear in a site's feed.
///
/// The same filter is applied to the primary tree walk and to every
/// shared-content subtree, so an excluded node can never reach the feed
/// through a remapping.
pub struct NodeFilter<'a> {
    source: &'a dyn ContentSource,
    selection: Selection<'a>,
    exclusion: Exclusion<'a>,
}

impl<'a> NodeFilter<'a> {
    pub fn new(source: &'a dyn ContentSource, selection: Selection<'a>, exclusion: Exclusion<'a>) -> Self {
        Self {
            source,
            selection,
            exclusion,
        }
    }

    pub fn for_site(source: &'a dyn ContentSource, site: &'a SiteConfig) -> Self {
        Self::new(source, Selection::for_site(site), Exclusion::for_site(site))
    }

    pub fn selection(&self) -> Selection<'a> {
        self.selection
    }

    pub fn is_eligible(&self, node: &ContentNode) -> bool {
        // Nodes without type information are never published
        let Some(template) = node.template_id.as_deref() else {
            return false;
        };

        let selected = match self.selection {
            Selection::AllowList(templates) => templates.contains(template),
            Selection::LayoutPresence { device } => self.source.has_layout(node, device),
        };

        selected && !self.exclusion.excludes(node)
    }

    /// Keeps eligible nodes, preserving order.
    pub fn retain(&self, nodes: Vec<ContentNode>) -> Vec<ContentNode> {
        let before = nodes.len();
        let kept: Vec<ContentNode> = nodes.into_iter().filter(|n| self.is_eligible(n)).collect();
        tracing::debug!(
            considered = before,
            eligible = kept.len(),
            "Filtered content nodes"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MemoryRepository, NodeRecord, ReadIdentity};

    fn repo() -> MemoryRepository {
        MemoryRepository::from_records(vec![
            NodeRecord::new("home", "/home").template("Page").layout("default"),
            NodeRecord::new("article", "/home/article").template("Article"),
            NodeRecord::new("folder", "/home/folder").template("Folder"),
            NodeRecord::new("hidden", "/home/hidden")
                .template("Article")
                .layout("default")
                .field("Hide", "1"),
            NodeRecord::new("untyped", "/home/untyped").layout("default"),
        ])
        .unwrap()
    }

    fn node(repo: &MemoryRepository, path: &str) -> ContentNode {
        repo.item(path, &ReadIdentity::new("anon")).unwrap()
    }

    fn site() -> SiteConfig {
        SiteConfig {
            name: "web".to_string(),
            root_path: "/home".to_string(),
            ..SiteConfig::default()
        }
    }

    #[test]
    fn test_allow_list_selects_enabled_templates() {
        let repo = repo();
        let mut site = site();
        site.enabled_templates = ["Page", "Article"].map(String::from).into();
        let filter = NodeFilter::for_site(&repo, &site);

        assert!(matches!(filter.selection(), Selection::AllowList(_)));
        assert!(filter.is_eligible(&node(&repo, "/home")));
        assert!(filter.is_eligible(&node(&repo, "/home/article")));
        assert!(!filter.is_eligible(&node(&repo, "/home/folder")));
    }

    #[test]
    fn test_legacy_excluded_items() {
        let repo = repo();
        let mut site = site();
        site.enabled_templates = ["Article"].map(String::from).into();
        site.excluded_items.insert("article".to_string());
        let filter = NodeFilter::for_site(&repo, &site);

        assert!(!filter.is_eligible(&node(&repo, "/home/article")));
        // Legacy mode ignores the flag field entirely
        assert!(filter.is_eligible(&node(&repo, "/home/hidden")));
    }

    #[test]
    fn test_exclusion_flag_field() {
        let repo = repo();
        let mut site = site();
        site.enabled_templates = ["Article"].map(String::from).into();
        site.exclusion_field = Some("Hide".to_string());
        let filter = NodeFilter::for_site(&repo, &site);

        assert!(filter.is_eligible(&node(&repo, "/home/article")));
        assert!(!filter.is_eligible(&node(&repo, "/home/hidden")));
    }

    #[test]
    fn test_layout_presence_mode_when_no_templates() {
        let repo = repo();
        let mut site = site();
        site.exclusion_field = Some("Hide".to_string());
        let filter = NodeFilter::for_site(&repo, &site);

        assert!(matches!(
            filter.selection(),
            Selection::LayoutPresence { device: "default" }
        ));
        assert!(filter.is_eligible(&node(&repo, "/home")));
        assert!(!filter.is_eligible(&node(&repo, "/home/article")));
        assert!(!filter.is_eligible(&node(&repo, "/home/hidden")));
    }

    #[test]
    fn test_untyped_nodes_never_eligible() {
        let repo = repo();
        let site = site();
        let filter = NodeFilter::for_site(&repo, &site);
        assert!(!filter.is_eligible(&node(&repo, "/home/untyped")));
    }

    #[test]
    fn test_retain_preserves_order() {
        let repo = repo();
        let mut site = site();
        site.enabled_templates = ["Page", "Article"].map(String::from).into();
        let filter = NodeFilter::for_site(&repo, &site);

        let nodes = vec![
            node(&repo, "/home/hidden"),
            node(&repo, "/home/folder"),
            node(&repo, "/home"),
        ];
        let kept: Vec<String> = filter.retain(nodes).into_iter().map(|n| n.id).collect();
        assert_eq!(kept, vec!["hidden", "home"]);
    }
}

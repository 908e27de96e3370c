//! Feed entries and the ordering/limit policy.
//!
//! Entries are ordered by priority, highest first. Entries without a
//! priority come last and ties keep discovery order (primary walk, then
//! shared content). The ordered list is then truncated to the site limit,
//! so the lowest priorities are the ones dropped.

use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::FieldNames;
use crate::content::{ContentNode, Field};
use crate::feed::canonical::Canonicalizer;
use crate::feed::shared::SharedEntry;
use crate::feed::SiteError;

/// Format of `<lastmod>`: ISO-8601 date-time with zone offset.
pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Sitemap `changefreq` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeFrequency::Always => "always",
            ChangeFrequency::Hourly => "hourly",
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Yearly => "yearly",
            ChangeFrequency::Never => "never",
        }
    }
}

impl FromStr for ChangeFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ChangeFrequency::Always),
            "hourly" => Ok(ChangeFrequency::Hourly),
            "daily" => Ok(ChangeFrequency::Daily),
            "weekly" => Ok(ChangeFrequency::Weekly),
            "monthly" => Ok(ChangeFrequency::Monthly),
            "yearly" => Ok(ChangeFrequency::Yearly),
            "never" => Ok(ChangeFrequency::Never),
            other => Err(format!("unknown change frequency '{other}'")),
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priority in `0.0..=1.0`, keeping the text it was written as.
#[derive(Debug, Clone, PartialEq)]
pub struct Priority {
    value: f64,
    text: String,
}

impl Priority {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let value: f64 = text
            .parse()
            .map_err(|_| format!("priority '{text}' is not a number"))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("priority '{text}' is outside 0.0-1.0"));
        }
        Ok(Self {
            value,
            text: text.to_string(),
        })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One `<url>` of the document. `location` is already HTML-escaped.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub location: String,
    pub last_modified: String,
    pub change_frequency: Option<ChangeFrequency>,
    pub priority: Option<Priority>,
}

impl FeedEntry {
    pub fn new(location: impl Into<String>, last_modified: DateTime<FixedOffset>) -> Self {
        Self {
            location: location.into(),
            last_modified: last_modified.format(LAST_MODIFIED_FORMAT).to_string(),
            change_frequency: None,
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_change_frequency(mut self, change_frequency: ChangeFrequency) -> Self {
        self.change_frequency = Some(change_frequency);
        self
    }

    /// Ordering key; entries without a priority sort below 0.0.
    pub fn sort_key(&self) -> f64 {
        self.priority.as_ref().map_or(-1.0, Priority::value)
    }
}

/// Orders entries by descending priority (stable) and keeps the first `limit`.
pub fn order_and_limit(mut entries: Vec<FeedEntry>, limit: usize) -> Vec<FeedEntry> {
    entries.sort_by(|a, b| b.sort_key().total_cmp(&a.sort_key()));
    if entries.len() > limit {
        tracing::info!(
            total = entries.len(),
            limit,
            dropped = entries.len() - limit,
            "Entry limit reached, dropping lowest priorities"
        );
        entries.truncate(limit);
    }
    entries
}

/// Builds the ordered entry list of one site.
pub struct EntryAssembler<'a> {
    canonicalizer: &'a Canonicalizer<'a>,
    fields: &'a FieldNames,
    limit: usize,
}

impl<'a> EntryAssembler<'a> {
    pub fn new(canonicalizer: &'a Canonicalizer<'a>, fields: &'a FieldNames, limit: usize) -> Self {
        Self {
            canonicalizer,
            fields,
            limit,
        }
    }

    /// Entry for `node` published at `location`.
    pub fn entry_for(&self, node: &ContentNode, location: String) -> FeedEntry {
        let mut entry = FeedEntry::new(location, node.updated);

        if let Some(raw) = node.known_field(Field::ChangeFrequency, self.fields) {
            match raw.parse::<ChangeFrequency>() {
                Ok(freq) => entry.change_frequency = Some(freq),
                Err(reason) => {
                    tracing::warn!(path = %node.path, reason = %reason, "Ignoring change frequency")
                }
            }
        }

        if let Some(raw) = node.known_field(Field::Priority, self.fields) {
            match raw.parse::<Priority>() {
                Ok(priority) => entry.priority = Some(priority),
                Err(reason) => tracing::warn!(path = %node.path, reason = %reason, "Ignoring priority"),
            }
        }

        entry
    }

    /// Combines the eligible primary nodes (root first) with the shared
    /// entries, drops duplicate locations and applies ordering and limit.
    ///
    /// # Errors
    ///
    /// Canonicalization failures of primary nodes.
    pub fn assemble(
        &self,
        primary: &[ContentNode],
        shared: Vec<SharedEntry>,
    ) -> Result<Vec<FeedEntry>, SiteError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(primary.len() + shared.len());

        for node in primary {
            let location = self.canonicalizer.canonical_url(node)?;
            if seen.insert(location.clone()) {
                entries.push(self.entry_for(node, location));
            } else {
                tracing::debug!(path = %node.path, "Duplicate location, skipping");
            }
        }

        for SharedEntry { node, location } in shared {
            if seen.insert(location.clone()) {
                entries.push(self.entry_for(&node, location));
            } else {
                tracing::debug!(path = %node.path, "Duplicate shared location, skipping");
            }
        }

        Ok(order_and_limit(entries, self.limit))
    }
}

//! Configuration file parser for `sitefeed.toml`.
//!
//! The file carries the global sitemap variables (namespace, production flag,
//! robots and notification settings) and one `[[sites]]` table per published
//! site. A missing or empty file yields `Config::default()`, which has no
//! sites. Unknown top-level keys are accepted but logged as warnings.
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{is_path_within, Field};
use crate::feed::SiteError;

/// Sitemap protocol namespace used when `xmlns` is not configured.
pub const DEFAULT_XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Identity the content tree is read as unless configured otherwise.
pub const DEFAULT_READ_IDENTITY: &str = r"extranet\Anonymous";

/// Maximum number of URLs a single sitemap document may contain.
pub const PROTOCOL_URL_LIMIT: usize = 50_000;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration: global variables plus the configured sites.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Namespace written as the `xmlns` attribute of every document.
    pub xmlns: String,

    /// Production mode registers sitemaps in robots.txt and pings search
    /// engines. Non-production mode writes a disallow-all robots file instead.
    pub production: bool,

    /// Whether `refresh` merges sitemap references into the robots file.
    pub generate_robots_file: bool,

    /// Directory that generated documents and the robots file are written to.
    pub document_root: PathBuf,

    /// Robots directives file name, relative to `document_root`.
    pub robots_file: String,

    /// File name of the fleet-wide sitemap index. `None` disables the index.
    pub index_file_name: Option<String>,

    /// Path of the JSON content snapshot backing the content source.
    pub content_source: Option<PathBuf>,

    /// Low-privilege identity the content tree is read as.
    pub read_identity: String,

    /// Per-endpoint timeout for search-engine notifications.
    pub notify_timeout_secs: u64,

    /// Search-engine ping URL prefixes; the encoded feed URL is appended.
    pub search_engines: Vec<String>,

    /// Listen address for `sitefeed serve`.
    pub bind: String,

    /// Number of sites regenerated concurrently by `refresh`.
    pub refresh_concurrency: usize,

    pub sites: Vec<SiteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xmlns: DEFAULT_XMLNS.to_string(),
            production: false,
            generate_robots_file: false,
            document_root: PathBuf::from("."),
            robots_file: "robots.txt".to_string(),
            index_file_name: None,
            content_source: None,
            read_identity: DEFAULT_READ_IDENTITY.to_string(),
            notify_timeout_secs: 10,
            search_engines: Vec::new(),
            bind: "127.0.0.1:8080".to_string(),
            refresh_concurrency: 4,
            sites: Vec::new(),
        }
    }
}

/// URL scheme used for canonical locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shared-content definition: descendants of `content_location` are
/// republished under `parent_item`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedContentConfig {
    pub content_location: String,
    pub parent_item: String,
}

impl SharedContentConfig {
    /// Definitions with either path blank are ignored.
    pub fn is_complete(&self) -> bool {
        !self.content_location.trim().is_empty() && !self.parent_item.trim().is_empty()
    }
}

/// Names of the content fields the engine reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub priority: String,
    pub change_frequency: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            priority: "Priority".to_string(),
            change_frequency: "Change Frequency".to_string(),
        }
    }
}

impl FieldNames {
    pub fn name_of(&self, field: Field) -> &str {
        match field {
            Field::Priority => &self.priority,
            Field::ChangeFrequency => &self.change_frequency,
        }
    }
}

/// Per-site settings. Immutable for the duration of a generation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site identifier; also the feed cache key.
    pub name: String,

    /// Content path the tree walk starts from.
    pub root_path: String,

    /// Output file name, also the request path the HTTP surface answers on.
    pub file_name: String,

    /// Template identifiers eligible for inclusion. Empty selects the
    /// layout-presence mode.
    pub enabled_templates: BTreeSet<String>,

    /// Item identifiers never included (legacy exclusion).
    pub excluded_items: BTreeSet<String>,

    /// Name of a per-item checkbox field that excludes the item when set.
    pub exclusion_field: Option<String>,

    /// Preferred authority for canonical URLs. A leading scheme is ignored.
    pub server_url: Option<String>,

    /// Site host name, used when `server_url` is not set.
    pub hostname: Option<String>,

    pub scheme: Scheme,

    pub shared_content: Vec<SharedContentConfig>,

    /// Rebase shared items by leaf name only instead of by relative suffix.
    pub cleanup_bucket_path: bool,

    /// Maximum number of entries in the document (clamped to 50 000).
    pub url_limit: usize,

    /// Lifetime of a cached document.
    pub cache_ttl_secs: u64,

    /// Device whose layout decides eligibility in layout-presence mode.
    pub device: String,

    /// Force resolved links to lower case.
    pub lowercase_urls: bool,

    pub fields: FieldNames,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            root_path: String::new(),
            file_name: "sitemap.xml".to_string(),
            enabled_templates: BTreeSet::new(),
            excluded_items: BTreeSet::new(),
            exclusion_field: None,
            server_url: None,
            hostname: None,
            scheme: Scheme::Http,
            shared_content: Vec::new(),
            cleanup_bucket_path: false,
            url_limit: PROTOCOL_URL_LIMIT,
            cache_ttl_secs: 900,
            device: "default".to_string(),
            lowercase_urls: false,
            fields: FieldNames::default(),
        }
    }
}

impl SiteConfig {
    /// Entry limit after clamping to the protocol maximum.
    pub fn effective_limit(&self) -> usize {
        self.url_limit.min(PROTOCOL_URL_LIMIT)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Shared-content definitions with both paths present.
    pub fn complete_shared_content(&self) -> impl Iterator<Item = &SharedContentConfig> {
        self.shared_content.iter().filter(|s| s.is_complete())
    }

    /// Checks the settings a generation run cannot do without.
    ///
    /// # Errors
    ///
    /// - [`SiteError::ConfigurationMissing`] when the name, root path or file
    ///   name is blank
    /// - [`SiteError::ConfigurationInvalid`] when both exclusion styles are
    ///   configured, or when two shared-content locations overlap
    pub fn validate(&self) -> Result<(), SiteError> {
        let missing = |setting: &str| SiteError::ConfigurationMissing {
            site: self.name.clone(),
            setting: setting.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.root_path.trim().is_empty() {
            return Err(missing("root_path"));
        }
        if self.file_name.trim().is_empty() {
            return Err(missing("file_name"));
        }

        let invalid = |reason: String| SiteError::ConfigurationInvalid {
            site: self.name.clone(),
            reason,
        };
        if !self.excluded_items.is_empty() && self.exclusion_field.is_some() {
            return Err(invalid(
                "excluded_items and exclusion_field are mutually exclusive".to_string(),
            ));
        }

        let locations: Vec<&str> = self
            .complete_shared_content()
            .map(|s| s.content_location.as_str())
            .collect();
        for (i, a) in locations.iter().enumerate() {
            for b in &locations[i + 1..] {
                if is_path_within(a, b) || is_path_within(b, a) {
                    return Err(invalid(format!(
                        "shared content locations '{a}' and '{b}' overlap"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 13] = [
        "xmlns",
        "production",
        "generate_robots_file",
        "document_root",
        "robots_file",
        "index_file_name",
        "content_source",
        "read_identity",
        "notify_timeout_secs",
        "search_engines",
        "bind",
        "refresh_concurrency",
        "sites",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a runaway file
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            sites = config.sites.len(),
            production = config.production,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs.max(1))
    }

    pub fn robots_path(&self) -> PathBuf {
        self.document_root.join(&self.robots_file)
    }

    /// Where a site's (or the index's) document is written.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.document_root.join(file_name.trim_start_matches('/'))
    }
}

// ============================================================================
// Tests
// ============================================================================

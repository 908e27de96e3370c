//! Orchestration of generation, caching, persistence, robots registration
//! and notification across all configured sites.
//!
//! Sites are independent: a failure in one is logged and reported, and the
//! remaining sites are still refreshed. The HTTP-facing
//! [`FeedEngine::document_for`] never fails; it falls back to the last good
//! document, then to an empty one.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::FeedCache;
use crate::config::{Config, SiteConfig};
use crate::content::{ContentSource, ReadIdentity};
use crate::feed::{
    digest_hex, empty_document, generate_site, render_index, Canonicalizer, FeedDocument,
    GeneratedFeed, SiteError, SitemapRef,
};
use crate::notify::{NotifyError, Notifier, PingResult};
use crate::robots::{RobotsOutcome, RobotsRegistrar};
use crate::util::write_atomic;

/// What a successful refresh of one site did.
#[derive(Debug)]
pub struct SiteRefresh {
    pub entry_count: usize,
    pub path: PathBuf,
    pub feed_url: Option<String>,
    /// False when the document on disk was already identical.
    pub changed: bool,
    pub robots: Option<RobotsOutcome>,
    pub pings: Vec<PingResult>,
}

#[derive(Debug)]
pub struct SiteReport {
    pub site: String,
    pub outcome: Result<SiteRefresh, SiteError>,
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    pub sites: Vec<SiteReport>,
    /// Where the sitemap index was written, when configured.
    pub index: Option<PathBuf>,
}

impl RefreshReport {
    pub fn succeeded(&self) -> usize {
        self.sites.iter().filter(|s| s.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.sites.len() - self.succeeded()
    }
}

pub struct FeedEngine {
    config: Arc<Config>,
    source: Arc<dyn ContentSource>,
    identity: ReadIdentity,
    cache: FeedCache,
    robots: RobotsRegistrar,
    notifier: Notifier,
}

impl FeedEngine {
    /// Builds an engine with a notifier configured from `config`.
    pub fn new(config: Config, source: Arc<dyn ContentSource>) -> Result<Self, NotifyError> {
        let notifier = Notifier::from_config(&config)?;
        Ok(Self::with_notifier(config, source, notifier))
    }

    pub fn with_notifier(config: Config, source: Arc<dyn ContentSource>, notifier: Notifier) -> Self {
        Self {
            identity: ReadIdentity::new(config.read_identity.clone()),
            robots: RobotsRegistrar::new(config.robots_path()),
            config: Arc::new(config),
            source,
            cache: FeedCache::new(),
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn site(&self, name: &str) -> Result<&SiteConfig, SiteError> {
        self.config
            .site(name)
            .ok_or_else(|| SiteError::UnknownSite(name.to_string()))
    }

    /// Runs the generation pipeline for `site` without touching the cache.
    pub fn build(&self, site: &str) -> Result<GeneratedFeed, SiteError> {
        let site = self.site(site)?;
        generate_site(self.source.as_ref(), &self.identity, site, &self.config.xmlns)
    }

    /// Cached document for `site`, regenerating it on a miss.
    ///
    /// On failure the last good document is served, or an empty document
    /// when there is none.
    pub async fn document_for(&self, site: &str) -> FeedDocument {
        if let Some(document) = self.cache.get(site).await {
            return document;
        }

        let result = match self.site(site) {
            Ok(config) => self
                .generate(config)
                .await
                .map(|feed| (feed, config.cache_ttl())),
            Err(e) => Err(e),
        };

        match result {
            Ok((feed, ttl)) => {
                self.cache.insert(site, feed.document.clone(), ttl).await;
                feed.document
            }
            Err(e) => {
                tracing::error!(site = %site, error = %e, "Sitemap generation failed");
                match self.cache.get_stale(site).await {
                    Some(stale) => {
                        tracing::warn!(site = %site, "Serving stale sitemap");
                        stale
                    }
                    None => FeedDocument::new(empty_document(&self.config.xmlns)),
                }
            }
        }
    }

    /// Runs the pipeline on the blocking pool; tree walks are synchronous.
    async fn generate(&self, site: &SiteConfig) -> Result<GeneratedFeed, SiteError> {
        let source = Arc::clone(&self.source);
        let config = Arc::clone(&self.config);
        let identity = self.identity.clone();
        let site = site.clone();
        let name = site.name.clone();
        tokio::task::spawn_blocking(move || {
            generate_site(source.as_ref(), &identity, &site, &config.xmlns)
        })
        .await
        .map_err(|source| SiteError::Task { site: name, source })?
    }

    /// Public URL of a site's document.
    pub fn feed_url(&self, site: &SiteConfig) -> Option<String> {
        Canonicalizer::new(self.source.as_ref(), site).feed_url()
    }

    /// Sitemap index over every site with a known public URL.
    pub async fn index_document(&self) -> FeedDocument {
        let mut refs = Vec::with_capacity(self.config.sites.len());
        for site in &self.config.sites {
            let Some(location) = self.feed_url(site) else {
                continue;
            };
            // Warms the cache so lastmod reflects a real generation
            self.document_for(&site.name).await;
            let last_modified = self.cache.generated_at(&site.name).await.map(format_lastmod);
            refs.push(SitemapRef {
                location,
                last_modified,
            });
        }

        match render_index(&self.config.xmlns, &refs) {
            Ok(body) => FeedDocument::new(body),
            Err(e) => {
                tracing::error!(error = %e, "Sitemap index generation failed");
                FeedDocument::new(empty_document(&self.config.xmlns))
            }
        }
    }

    /// Regenerates every configured site, writes documents and the index,
    /// then registers and notifies.
    pub async fn refresh_all(&self) -> RefreshReport {
        let concurrency = self.config.refresh_concurrency.max(1);
        let sites: Vec<SiteReport> = stream::iter(self.config.sites.iter())
            .map(|site| async move {
                let outcome = self.refresh_site(site).await;
                if let Err(e) = &outcome {
                    tracing::error!(site = %site.name, error = %e, "Site refresh failed");
                }
                SiteReport {
                    site: site.name.clone(),
                    outcome,
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let index = match &self.config.index_file_name {
            Some(file_name) => self.write_index(file_name, &sites).await,
            None => None,
        };

        RefreshReport { sites, index }
    }

    async fn refresh_site(&self, site: &SiteConfig) -> Result<SiteRefresh, SiteError> {
        let feed = self.generate(site).await?;
        let path = self.config.output_path(&site.file_name);

        let previous = tokio::fs::read(&path).await.ok().map(|bytes| digest_hex(&bytes));
        let changed = previous.as_deref() != Some(feed.document.digest.as_str());
        if changed {
            write_file(&path, &feed.document.body)
                .await
                .map_err(|source| SiteError::Io {
                    site: site.name.clone(),
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(site = %site.name, path = %path.display(), "Wrote sitemap");
        } else {
            tracing::debug!(site = %site.name, "Sitemap unchanged on disk");
        }

        self.cache
            .insert(&site.name, feed.document.clone(), site.cache_ttl())
            .await;

        let robots = self.register_robots(site, feed.feed_url.as_deref()).await;

        let pings = match (&feed.feed_url, self.config.production && changed) {
            (Some(url), true) => self.notifier.notify(url).await,
            _ => Vec::new(),
        };

        Ok(SiteRefresh {
            entry_count: feed.entry_count,
            path,
            feed_url: feed.feed_url,
            changed,
            robots,
            pings,
        })
    }

    /// Robots failures are logged, not fatal for the site.
    async fn register_robots(&self, site: &SiteConfig, feed_url: Option<&str>) -> Option<RobotsOutcome> {
        if !self.config.generate_robots_file {
            return None;
        }

        let production = self.config.production;
        let url = match feed_url {
            Some(url) => url,
            None if !production => "",
            None => {
                tracing::warn!(site = %site.name, "No public sitemap URL, not registering in robots file");
                return None;
            }
        };

        match self.robots.register(url, production).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(site = %site.name, error = %e, "Failed to update robots file");
                None
            }
        }
    }

    async fn write_index(&self, file_name: &str, sites: &[SiteReport]) -> Option<PathBuf> {
        let now = format_lastmod(Utc::now());
        let refs: Vec<SitemapRef> = sites
            .iter()
            .filter_map(|report| report.outcome.as_ref().ok())
            .filter_map(|refresh| refresh.feed_url.clone())
            .map(|location| SitemapRef {
                location,
                last_modified: Some(now.clone()),
            })
            .collect();

        let body = match render_index(&self.config.xmlns, &refs) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Sitemap index generation failed");
                return None;
            }
        };

        let path = self.config.output_path(file_name);
        match write_file(&path, &body).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), sitemaps = refs.len(), "Wrote sitemap index");
                Some(path)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write sitemap index");
                None
            }
        }
    }
}

fn format_lastmod(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

async fn write_file(path: &std::path::Path, body: &str) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let body = body.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || write_atomic(&path, &body))
        .await
        .map_err(std::io::Error::other)?
}

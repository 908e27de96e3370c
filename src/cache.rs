//! Time-boxed cache of rendered documents, keyed by site name.
//!
//! Expiry is lazy: an entry older than its TTL is simply not returned by
//! [`FeedCache::get`]. Expired entries are kept around so a failed
//! regeneration can still serve the last good document
//! ([`FeedCache::get_stale`]). There is one entry per site and no eviction.
//!
//! Timestamps use `tokio::time::Instant` so tests can drive expiry with a
//! paused clock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::feed::FeedDocument;

#[derive(Debug, Clone)]
struct CachedFeed {
    document: FeedDocument,
    inserted_at: Instant,
    /// Wall-clock time, reported as `lastmod` in the sitemap index.
    generated_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedFeed {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

#[derive(Debug, Default)]
pub struct FeedCache {
    entries: RwLock<HashMap<String, CachedFeed>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached document for `site` if it is younger than its TTL.
    pub async fn get(&self, site: &str) -> Option<FeedDocument> {
        let entries = self.entries.read().await;
        let hit = entries
            .get(site)
            .filter(|e| e.is_fresh(Instant::now()))
            .map(|e| e.document.clone());
        tracing::debug!(site = %site, hit = hit.is_some(), "Feed cache lookup");
        hit
    }

    /// The cached document for `site` regardless of age.
    pub async fn get_stale(&self, site: &str) -> Option<FeedDocument> {
        self.entries
            .read()
            .await
            .get(site)
            .map(|e| e.document.clone())
    }

    /// Stores `document` for `site`, replacing any previous entry.
    pub async fn insert(&self, site: &str, document: FeedDocument, ttl: Duration) {
        let entry = CachedFeed {
            document,
            inserted_at: Instant::now(),
            generated_at: Utc::now(),
            ttl,
        };
        self.entries.write().await.insert(site.to_string(), entry);
    }

    /// When the document cached for `site` was stored, fresh or not.
    pub async fn generated_at(&self, site: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(site).map(|e| e.generated_at)
    }
}

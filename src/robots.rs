//! Registration of sitemap documents in the shared robots file.
//!
//! The file is read, merged and fully rewritten on every registration, so
//! repeating a registration leaves it unchanged. All sites share one file;
//! writers are serialized through the registrar's lock.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::util::write_atomic;

/// Content written in non-production mode.
pub const DISALLOW_ALL: &str = "User-agent: *\nDisallow: /\n";

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("Failed to read robots file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write robots file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Robots writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What a registration did to the robots file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsOutcome {
    Added,
    AlreadyPresent,
    /// Non-production: the file now disallows everything.
    Disallowed,
}

/// `Sitemap:` directive for `feed_url`.
pub fn sitemap_line(feed_url: &str) -> String {
    format!("Sitemap: {feed_url}")
}

/// Appends the directive for `feed_url` unless `existing` already has that exact line.
///
/// ```
/// use sitefeed::robots::merge;
///
/// let once = merge("User-agent: *\nAllow: /", "http://x/sitemap.xml");
/// assert_eq!(once, "User-agent: *\nAllow: /\nSitemap: http://x/sitemap.xml\n");
/// assert_eq!(merge(&once, "http://x/sitemap.xml"), once);
/// ```
pub fn merge(existing: &str, feed_url: &str) -> String {
    let line = sitemap_line(feed_url);
    if existing.lines().any(|l| l.trim_end() == line) {
        return existing.to_string();
    }

    let mut merged = String::with_capacity(existing.len() + line.len() + 2);
    merged.push_str(existing);
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    merged.push_str(&line);
    merged.push('\n');
    merged
}

fn register_blocking(path: &Path, feed_url: &str, production: bool) -> Result<RobotsOutcome, RobotsError> {
    if !production {
        write_atomic(path, DISALLOW_ALL.as_bytes()).map_err(|source| RobotsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(RobotsOutcome::Disallowed);
    }

    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(RobotsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let merged = merge(&existing, feed_url);
    let outcome = if merged == existing {
        RobotsOutcome::AlreadyPresent
    } else {
        RobotsOutcome::Added
    };

    // Rewrite even when unchanged so the file always reflects the merge
    write_atomic(path, merged.as_bytes()).map_err(|source| RobotsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(outcome)
}

/// Single writer for the robots file at `path`.
#[derive(Debug)]
pub struct RobotsRegistrar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RobotsRegistrar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Registers `feed_url` (production) or writes the disallow-all file.
    pub async fn register(&self, feed_url: &str, production: bool) -> Result<RobotsOutcome, RobotsError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let feed_url = feed_url.to_string();
        let outcome =
            tokio::task::spawn_blocking(move || register_blocking(&path, &feed_url, production))
                .await??;
        tracing::debug!(path = %self.path.display(), outcome = ?outcome, "Updated robots file");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sitefeed_robots_test_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_merge_into_empty() {
        assert_eq!(
            merge("", "http://x/sitemap.xml"),
            "Sitemap: http://x/sitemap.xml\n"
        );
    }

    #[test]
    fn test_merge_keeps_other_sitemaps() {
        let merged = merge("Sitemap: http://a/sitemap.xml\n", "http://b/sitemap.xml");
        assert_eq!(
            merged,
            "Sitemap: http://a/sitemap.xml\nSitemap: http://b/sitemap.xml\n"
        );
    }

    #[test]
    fn test_merge_matches_whole_lines_only() {
        let existing = "Sitemap: http://x/sitemap.xml.gz\n";
        assert_eq!(
            merge(existing, "http://x/sitemap.xml"),
            "Sitemap: http://x/sitemap.xml.gz\nSitemap: http://x/sitemap.xml\n"
        );
        // Windows line endings still count as present
        let crlf = "Sitemap: http://x/sitemap.xml\r\n";
        assert_eq!(merge(crlf, "http://x/sitemap.xml"), crlf);
    }

    #[tokio::test]
    async fn test_register_twice_writes_one_line() {
        let dir = temp_dir("twice");
        let path = dir.join("robots.txt");
        std::fs::write(&path, "User-agent: *\nAllow: /\n").unwrap();
        let registrar = RobotsRegistrar::new(&path);

        let first = registrar.register("http://x/sitemap.xml", true).await.unwrap();
        let second = registrar.register("http://x/sitemap.xml", true).await.unwrap();
        assert_eq!(first, RobotsOutcome::Added);
        assert_eq!(second, RobotsOutcome::AlreadyPresent);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Sitemap: http://x/sitemap.xml").count(), 1);
        assert!(content.starts_with("User-agent: *\nAllow: /\n"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_non_production_disallows_everything() {
        let dir = temp_dir("non_production");
        let path = dir.join("robots.txt");
        std::fs::write(&path, "Sitemap: http://x/sitemap.xml\n").unwrap();
        let registrar = RobotsRegistrar::new(&path);

        let outcome = registrar.register("http://x/sitemap.xml", false).await.unwrap();
        assert_eq!(outcome, RobotsOutcome::Disallowed);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DISALLOW_ALL);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_concurrent_registrations_are_not_lost() {
        let dir = temp_dir("concurrent");
        let path = dir.join("robots.txt");
        let registrar = Arc::new(RobotsRegistrar::new(&path));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let registrar = Arc::clone(&registrar);
                tokio::spawn(async move {
                    registrar
                        .register(&format!("http://site{i}/sitemap.xml"), true)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        for i in 0..8 {
            assert!(content.contains(&format!("Sitemap: http://site{i}/sitemap.xml")));
        }
        assert_eq!(content.lines().count(), 8);

        std::fs::remove_dir_all(&dir).ok();
    }
}

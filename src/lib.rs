//! Sitemap feed generation for hierarchical content repositories.
//!
//! For every configured site the engine walks the content tree as a
//! low-privilege identity, selects publishable nodes, computes canonical
//! URLs (optionally republishing shared content under another path) and
//! renders a sitemap document. Documents are cached per site, written to
//! disk, registered in the robots file and announced to search engines.
//!
//! - [`content`]: the repository contract and the snapshot-backed source
//! - [`feed`]: the per-site generation pipeline
//! - [`engine`]: multi-site orchestration, caching and side effects
//! - [`server`]: the HTTP surface

pub mod cache;
pub mod config;
pub mod content;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod robots;
pub mod server;
pub mod util;

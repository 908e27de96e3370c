//! Per-site sitemap generation pipeline.
//!
//! A generation run for one site goes through these stages in order:
//!
//! - [`filter`] decides which content nodes are publishable
//! - [`shared`] republishes shared-area nodes under a site item
//! - [`canonical`] turns nodes into absolute, escaped URLs
//! - [`assembler`] builds entries and applies ordering and the URL limit
//! - [`xml`] renders the document
//!
//! [`generate_site`] ties them together. Everything here is synchronous and
//! works on one snapshot read at the start of the run; caching, robots
//! registration and notification live in the engine.

pub mod assembler;
pub mod canonical;
pub mod filter;
mod generator;
pub mod shared;
pub mod xml;

pub use assembler::{order_and_limit, ChangeFrequency, EntryAssembler, FeedEntry, Priority};
pub use canonical::{effective_authority, Canonicalizer};
pub use filter::{Exclusion, NodeFilter, Selection};
pub use generator::{digest_hex, generate_site, FeedDocument, GeneratedFeed, SiteError};
pub use shared::{rebase_leaf, rebase_suffix, DescendantStrategy, SharedEntry, SharedMapping};
pub use xml::{
    empty_document, parse_urlset, render_index, render_urlset, ParsedFeed, SerializeError,
    SitemapRef,
};

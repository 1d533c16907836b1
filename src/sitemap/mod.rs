//! Sitemap document scanning and change detection.
//!
//! - [`extract`] - the [`SitemapExtractor`] interface and its regex-based scanner
//! - [`diff`] - set difference between two documents' `<loc>` lists
//!
//! The feed manager only talks to the trait, so the scanner can be replaced by
//! a streaming XML parser without touching storage or orchestration code.

mod diff;
mod extract;

pub use diff::diff_locations;
pub use extract::{RegexExtractor, RootKind, SitemapExtractor, UrlEntry, SITEMAP_NAMESPACE_DOMAIN};

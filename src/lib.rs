//! Sitemap change monitor.
//!
//! Watches sitemap XML files for newly published URLs. Each monitored sitemap
//! keeps three generations of content in a key-value store (current, previous
//! and a per-day archive); a check pass diffs fresh downloads against the
//! stored current generation and yields a [`feed::ChangeBatch`] for whatever
//! delivers notifications.

pub mod config;
pub mod feed;
pub mod sitemap;
pub mod storage;
pub mod util;

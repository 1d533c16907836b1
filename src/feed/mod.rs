//! Sitemap monitoring: fetching, snapshot storage and check passes.
//!
//! - [`fetcher`] - HTTP retrieval behind the [`Fetch`] trait
//! - [`decode`] - gzip handling for `.gz` sitemaps
//! - [`keys`] - [`FeedKey`] and the storage key layout
//! - [`manager`] - [`FeedManager`], the monitored set and per-feed snapshots
//! - [`monitor`] - [`run_check_pass`], one sequential pass over all feeds
//!
//! # Storage layout
//!
//! | Key | Contents |
//! |---|---|
//! | `rss_feeds` | JSON array of monitored URLs |
//! | `sitemap_current_{hash}` | latest downloaded content |
//! | `sitemap_latest_{hash}` | previous generation |
//! | `sitemap_dated_{hash}_{YYYYMMDD}` | per-day archive |
//! | `last_update_{hash}` | `YYYYMMDD` of the last successful check |

mod decode;
mod fetcher;
mod keys;
mod manager;
mod monitor;
mod types;

pub use decode::{decode_body, is_gzip_url};
pub use fetcher::{
    Fetch, FetchError, HttpFetcher, DEFAULT_MAX_SITEMAP_BYTES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use keys::{FeedKey, FEEDS_KEY};
pub use manager::{FeedManager, ManagerSettings};
pub use monitor::{run_check_pass, watch, DEFAULT_FEED_DELAY};
pub use types::{
    AddOutcome, ChangeBatch, ChangeEntry, CheckError, CheckOutcome, ContentKind, FeedFailure,
    IndexExpansion, RemoveError,
};

//! Utility functions for common operations.
//!
//! - **URLs**: validation for monitored sitemaps, key normalisation, host
//!   extraction and child-sitemap resolution
//! - **Dates**: the [`Clock`] seam and `YYYYMMDD` stamps used in storage keys

mod clock;
mod urls;

pub use self::clock::{date_stamp, parse_date_stamp, Clock, FixedClock, SystemClock};
pub use self::urls::{
    domain_of, normalize_for_key, resolve_child_url, validate_feed_url, UrlValidationError,
};

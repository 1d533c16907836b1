use chrono::NaiveDate;
use crc32fast::Hasher as Crc32;
use std::fmt;

use crate::util::{date_stamp, normalize_for_key};

/// Storage key holding the JSON array of monitored URLs.
pub const FEEDS_KEY: &str = "rss_feeds";

const CURRENT_PREFIX: &str = "sitemap_current_";
const PREVIOUS_PREFIX: &str = "sitemap_latest_";
const ARCHIVE_PREFIX: &str = "sitemap_dated_";
const LAST_UPDATE_PREFIX: &str = "last_update_";

/// Short, stable identifier for a monitored URL.
///
/// CRC-32 of the normalised URL (lowercased, trailing slash removed), as
/// eight hex digits. Case and trailing-slash variants share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey(String);

impl FeedKey {
    pub fn from_url(url: &str) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(normalize_for_key(url).as_bytes());
        Self(format!("{:08x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn current(&self) -> String {
        format!("{CURRENT_PREFIX}{}", self.0)
    }

    /// Key of the generation rotated out of `current`.
    pub fn previous(&self) -> String {
        format!("{PREVIOUS_PREFIX}{}", self.0)
    }

    pub fn archive(&self, date: NaiveDate) -> String {
        format!("{ARCHIVE_PREFIX}{}_{}", self.0, date_stamp(date))
    }

    pub fn last_update(&self) -> String {
        format!("{LAST_UPDATE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

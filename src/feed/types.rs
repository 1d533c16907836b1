use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use super::fetcher::FetchError;
use crate::storage::StoreError;
use crate::util::UrlValidationError;

// ============================================================================
// Error Types
// ============================================================================

/// Why a single feed check failed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Sitemap indexes nested deeper than the configured limit
    #[error("Sitemap index nesting exceeds {0} levels")]
    IndexDepthExceeded(usize),
}

impl CheckError {
    /// Transport failures are worth retrying on a later pass.
    pub fn is_transient(&self) -> bool {
        match self {
            CheckError::Fetch(FetchError::HttpStatus(status)) => {
                *status == 429 || (500..600).contains(status)
            }
            CheckError::Fetch(
                FetchError::Network(_)
                | FetchError::Timeout
                | FetchError::IncompleteResponse { .. },
            ) => true,
            CheckError::Store(StoreError::InstanceLocked) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("Feed not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// Content Selection
// ============================================================================

/// Which stored generation of a feed to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Most recent download
    Current,
    /// Generation rotated out of `Current` by the last download
    Previous,
    /// Immutable copy taken on the given day
    Archive(NaiveDate),
}

// ============================================================================
// Check Outcomes
// ============================================================================

/// Result of expanding a sitemap index into its child sitemaps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexExpansion {
    pub success: bool,
    pub error_msg: Option<String>,
    /// New page URLs found across all children, in child order
    pub new_urls: Vec<String>,
    pub sub_sitemap_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Child URLs that were not monitored before this expansion
    pub new_feeds_added: Vec<String>,
}

/// Outcome of one download-and-save cycle for a feed.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Content fetched and stored as the new current generation.
    Updated {
        new_urls: Vec<String>,
        /// Storage key of today's archive copy
        archive_key: String,
        /// No earlier content existed, so nothing was diffed
        first_check: bool,
    },
    /// Already checked today; `new_urls` is the current-vs-previous diff.
    Skipped { new_urls: Vec<String> },
    /// The document was a sitemap index and was expanded.
    Index(IndexExpansion),
    Failed(CheckError),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            CheckOutcome::Updated { .. } | CheckOutcome::Skipped { .. } => true,
            CheckOutcome::Index(expansion) => expansion.success,
            CheckOutcome::Failed(_) => false,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CheckOutcome::Skipped { .. })
    }

    pub fn is_index(&self) -> bool {
        matches!(self, CheckOutcome::Index(_))
    }

    pub fn new_urls(&self) -> &[String] {
        match self {
            CheckOutcome::Updated { new_urls, .. } | CheckOutcome::Skipped { new_urls } => new_urls,
            CheckOutcome::Index(expansion) => &expansion.new_urls,
            CheckOutcome::Failed(_) => &[],
        }
    }

    pub fn archive_key(&self) -> Option<&str> {
        match self {
            CheckOutcome::Updated { archive_key, .. } => Some(archive_key),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CheckError> {
        match self {
            CheckOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        match self {
            CheckOutcome::Updated {
                first_check: true, ..
            } => "Initial snapshot saved".to_string(),
            CheckOutcome::Updated { new_urls, .. } if new_urls.is_empty() => {
                "No new URLs".to_string()
            }
            CheckOutcome::Updated { new_urls, .. } => format!("{} new URLs found", new_urls.len()),
            CheckOutcome::Skipped { new_urls } if new_urls.is_empty() => {
                "Already checked today".to_string()
            }
            CheckOutcome::Skipped { new_urls } => format!(
                "Already checked today ({} URLs from today's update)",
                new_urls.len()
            ),
            CheckOutcome::Index(expansion) => match &expansion.error_msg {
                Some(msg) => msg.clone(),
                None => format!(
                    "Sitemap index: {}/{} child sitemaps checked, {} new URLs",
                    expansion.success_count,
                    expansion.sub_sitemap_count,
                    expansion.new_urls.len()
                ),
            },
            CheckOutcome::Failed(e) => e.to_string(),
        }
    }
}

/// Outcome of [`FeedManager::add_feed`](super::FeedManager::add_feed).
#[derive(Debug)]
pub struct AddOutcome {
    pub url: String,
    pub outcome: CheckOutcome,
    /// The URL was appended to the monitored set by this call
    pub added: bool,
}

impl AddOutcome {
    pub fn is_index(&self) -> bool {
        self.outcome.is_index()
    }

    /// Number of child sitemaps when the URL was an index.
    pub fn sub_sitemaps(&self) -> Option<usize> {
        match &self.outcome {
            CheckOutcome::Index(expansion) => Some(expansion.sub_sitemap_count),
            _ => None,
        }
    }

    pub fn new_feeds_added(&self) -> &[String] {
        match &self.outcome {
            CheckOutcome::Index(expansion) => &expansion.new_feeds_added,
            _ => &[],
        }
    }
}

// ============================================================================
// Change Batch
// ============================================================================

/// A feed that produced new URLs during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEntry {
    pub url: String,
    /// Host of `url`
    pub domain: String,
    pub message: String,
    pub new_urls: Vec<String>,
    /// Archive key of the content this entry was computed from
    pub archive_key: Option<String>,
    pub is_index: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedFailure {
    pub url: String,
    pub error: String,
    pub transient: bool,
}

/// Everything one check pass found, handed to report/notification collaborators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeBatch {
    pub entries: Vec<ChangeEntry>,
    pub checked: usize,
    pub skipped: usize,
    pub failures: Vec<FeedFailure>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_new_urls(&self) -> usize {
        self.entries.iter().map(|e| e.new_urls.len()).sum()
    }
}

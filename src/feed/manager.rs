use chrono::NaiveDate;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use super::decode::decode_body;
use super::fetcher::{Fetch, DEFAULT_MAX_SITEMAP_BYTES};
use super::keys::{FeedKey, FEEDS_KEY};
use super::types::{AddOutcome, CheckError, CheckOutcome, ContentKind, IndexExpansion, RemoveError};
use crate::sitemap::{diff_locations, RegexExtractor, RootKind, SitemapExtractor};
use crate::storage::{KeyValueStore, StoreError};
use crate::util::{
    date_stamp, parse_date_stamp, resolve_child_url, validate_feed_url, Clock, SystemClock,
};

/// Tunables for download and index expansion.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Pause between children of a sitemap index
    pub child_delay: Duration,
    /// Deepest index nesting that is still expanded (top level is 0)
    pub max_index_depth: usize,
    /// Cap on decompressed sitemap size
    pub max_sitemap_bytes: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            child_delay: Duration::from_secs(1),
            max_index_depth: 3,
            max_sitemap_bytes: DEFAULT_MAX_SITEMAP_BYTES,
        }
    }
}

/// Owns the monitored-feed list and every feed's snapshots.
///
/// One instance is built per process and passed to whoever runs checks;
/// all state lives in the [`KeyValueStore`], none in the manager itself.
#[derive(Clone)]
pub struct FeedManager {
    store: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn SitemapExtractor>,
    clock: Arc<dyn Clock>,
    settings: ManagerSettings,
}

impl FeedManager {
    pub fn new(store: Arc<dyn KeyValueStore>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            store,
            fetcher,
            extractor: Arc::new(RegexExtractor::new()),
            clock: Arc::new(SystemClock),
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SitemapExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn extractor(&self) -> &dyn SitemapExtractor {
        self.extractor.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ========================================================================
    // Monitored Set
    // ========================================================================

    /// Monitored URLs in insertion order.
    ///
    /// Read or decode failures are logged and reported as an empty list.
    pub async fn list_feeds(&self) -> Vec<String> {
        match self.load_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load feed list, treating as empty");
                Vec::new()
            }
        }
    }

    /// Feed list with read and decode errors surfaced. Mutations of the
    /// monitored set must start from this, never from [`Self::list_feeds`].
    async fn load_feeds(&self) -> Result<Vec<String>, StoreError> {
        let Some(raw) = self.store.get(FEEDS_KEY).await? else {
            return Ok(Vec::new());
        };

        let feeds: Vec<String> = serde_json::from_str(&raw)?;
        let mut unique: Vec<String> = Vec::with_capacity(feeds.len());
        for feed in feeds {
            if !unique.contains(&feed) {
                unique.push(feed);
            }
        }
        Ok(unique)
    }

    async fn save_feeds(&self, feeds: &[String]) -> Result<(), StoreError> {
        let json = serde_json::to_string(feeds)?;
        self.store.put(FEEDS_KEY, &json).await
    }

    /// Append `url` to the monitored set if absent. Returns whether it was added.
    async fn register_feed(&self, url: &str) -> Result<bool, StoreError> {
        let mut feeds = self.load_feeds().await?;
        if feeds.iter().any(|f| f == url) {
            return Ok(false);
        }
        feeds.push(url.to_string());
        self.save_feeds(&feeds).await?;
        Ok(true)
    }

    /// Check `url` and start monitoring it if the check succeeds.
    ///
    /// An already-monitored URL is checked again (honouring `force_update`)
    /// without being re-added.
    pub async fn add_feed(&self, url: &str, force_update: bool) -> AddOutcome {
        let url = url.trim();
        if let Err(e) = validate_feed_url(url) {
            tracing::warn!(feed = %url, error = %e, "Rejected feed URL");
            return AddOutcome {
                url: url.to_string(),
                outcome: CheckOutcome::Failed(e.into()),
                added: false,
            };
        }

        let already_monitored = self.list_feeds().await.iter().any(|f| f == url);
        let outcome = self.download_and_save(url, force_update).await;

        if already_monitored || !outcome.is_success() {
            return AddOutcome {
                url: url.to_string(),
                outcome,
                added: false,
            };
        }

        // Re-read inside register_feed: index expansion may have added children.
        match self.register_feed(url).await {
            Ok(added) => {
                if added {
                    tracing::info!(feed = %url, "Started monitoring feed");
                }
                AddOutcome {
                    url: url.to_string(),
                    outcome,
                    added,
                }
            }
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Failed to save feed list");
                AddOutcome {
                    url: url.to_string(),
                    outcome: CheckOutcome::Failed(e.into()),
                    added: false,
                }
            }
        }
    }

    /// Stop monitoring `url`. Stored snapshots are kept.
    pub async fn remove_feed(&self, url: &str) -> Result<(), RemoveError> {
        let url = url.trim();
        let mut feeds = self.load_feeds().await?;
        let Some(pos) = feeds.iter().position(|f| f == url) else {
            return Err(RemoveError::NotFound(url.to_string()));
        };

        feeds.remove(pos);
        self.save_feeds(&feeds).await?;
        tracing::info!(feed = %url, remaining = feeds.len(), "Stopped monitoring feed");
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Read one stored generation of `url`. Read failures are logged as absence.
    pub async fn get_content(&self, url: &str, kind: ContentKind) -> Option<String> {
        let key = FeedKey::from_url(url);
        let storage_key = match kind {
            ContentKind::Current => key.current(),
            ContentKind::Previous => key.previous(),
            ContentKind::Archive(date) => key.archive(date),
        };
        self.read(&storage_key).await
    }

    /// Date of the last successful check of `url`.
    pub async fn last_checked(&self, url: &str) -> Option<NaiveDate> {
        let raw = self.read(&FeedKey::from_url(url).last_update()).await?;
        parse_date_stamp(&raw)
    }

    /// Days within the last `days` (today included) that have an archive copy.
    pub async fn archive_dates(&self, url: &str, days: u32) -> Vec<NaiveDate> {
        let key = FeedKey::from_url(url);
        let mut found = Vec::new();
        let mut date = self.today();
        for _ in 0..days {
            if self.read(&key.archive(date)).await.is_some() {
                found.push(date);
            }
            match date.pred_opt() {
                Some(prev) => date = prev,
                None => break,
            }
        }
        found
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Storage read failed, treating as missing");
                None
            }
        }
    }

    // ========================================================================
    // Download Cycle
    // ========================================================================

    /// Fetch `url`, diff it against the stored current content and rotate
    /// snapshots. Never fails: errors come back as [`CheckOutcome::Failed`].
    ///
    /// Without `force_update`, a feed already checked today is not fetched;
    /// the stored current-vs-previous diff is returned as
    /// [`CheckOutcome::Skipped`] instead.
    pub async fn download_and_save(&self, url: &str, force_update: bool) -> CheckOutcome {
        self.check_feed(url.to_string(), force_update, 0).await
    }

    fn check_feed(&self, url: String, force_update: bool, depth: usize) -> BoxFuture<'_, CheckOutcome> {
        Box::pin(async move {
            let key = FeedKey::from_url(&url);
            let today = self.today();

            if !force_update {
                if let Some(outcome) = self.same_day_outcome(&key, today).await {
                    tracing::debug!(feed = %url, "Already checked today, skipping fetch");
                    return outcome;
                }
            }

            let body = match self.fetcher.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "Sitemap fetch failed");
                    return CheckOutcome::Failed(e.into());
                }
            };

            let content = match decode_body(&url, &body, self.settings.max_sitemap_bytes) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "Sitemap decode failed");
                    return CheckOutcome::Failed(e.into());
                }
            };

            if self.extractor.classify_root(&content) == RootKind::SitemapIndex {
                if depth >= self.settings.max_index_depth {
                    tracing::warn!(feed = %url, depth = depth, "Sitemap index nested too deep");
                    return CheckOutcome::Failed(CheckError::IndexDepthExceeded(
                        self.settings.max_index_depth,
                    ));
                }
                return CheckOutcome::Index(
                    self.expand_index_at(&url, &content, force_update, depth).await,
                );
            }

            if !self.extractor.is_valid_sitemap(&content) {
                tracing::warn!(feed = %url, "Content does not look like a sitemap, storing anyway");
            }

            match self.store_snapshot(&key, &content, today).await {
                Ok(outcome) => {
                    tracing::debug!(
                        feed = %url,
                        new_urls = outcome.new_urls().len(),
                        "Stored sitemap snapshot"
                    );
                    outcome
                }
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "Failed to store sitemap snapshot");
                    CheckOutcome::Failed(e.into())
                }
            }
        })
    }

    /// `Some(Skipped)` when the feed was already checked on `today`.
    async fn same_day_outcome(&self, key: &FeedKey, today: NaiveDate) -> Option<CheckOutcome> {
        let last = self.read(&key.last_update()).await?;
        if last.trim() != date_stamp(today) {
            return None;
        }

        let current = self.read(&key.current()).await;
        let previous = self.read(&key.previous()).await;
        let new_urls = match (current, previous) {
            (Some(current), Some(previous)) => {
                diff_locations(self.extractor.as_ref(), &current, &previous)
            }
            _ => Vec::new(),
        };
        Some(CheckOutcome::Skipped { new_urls })
    }

    /// Rotate `current` into `previous`, store the new content and archive it.
    async fn store_snapshot(
        &self,
        key: &FeedKey,
        content: &str,
        today: NaiveDate,
    ) -> Result<CheckOutcome, StoreError> {
        let existing = self.read(&key.current()).await;
        let new_urls = existing
            .as_deref()
            .map(|old| diff_locations(self.extractor.as_ref(), content, old))
            .unwrap_or_default();

        if let Some(old) = &existing {
            self.store.put(&key.previous(), old).await?;
        }
        self.store.put(&key.current(), content).await?;

        let archive_key = key.archive(today);
        self.store.put(&archive_key, content).await?;
        self.store.put(&key.last_update(), &date_stamp(today)).await?;

        Ok(CheckOutcome::Updated {
            new_urls,
            archive_key,
            first_check: existing.is_none(),
        })
    }

    // ========================================================================
    // Sitemap Indexes
    // ========================================================================

    /// Monitor and check every child sitemap listed in `index_content`.
    ///
    /// Relative child references resolve against `index_url`. Children are
    /// checked one at a time with the configured pause between them; the
    /// returned `new_urls` joins the children's fresh diffs in order.
    pub async fn expand_index(&self, index_url: &str, index_content: &str) -> IndexExpansion {
        self.expand_index_at(index_url, index_content, false, 0).await
    }

    async fn expand_index_at(
        &self,
        index_url: &str,
        index_content: &str,
        force_update: bool,
        depth: usize,
    ) -> IndexExpansion {
        let mut expansion = IndexExpansion::default();
        let mut children: Vec<String> = Vec::new();

        for raw in self.extractor.child_sitemaps(index_content) {
            match resolve_child_url(index_url, &raw) {
                Some(child) if !children.contains(&child) => children.push(child),
                Some(_) => {}
                None => {
                    tracing::warn!(index = %index_url, child = %raw, "Unresolvable child sitemap");
                    expansion.error_count += 1;
                }
            }
        }

        expansion.sub_sitemap_count = children.len() + expansion.error_count;
        if children.is_empty() {
            expansion.error_msg = Some("Sitemap index lists no child sitemaps".to_string());
            return expansion;
        }

        tracing::info!(index = %index_url, children = children.len(), "Expanding sitemap index");

        for (i, child) in children.into_iter().enumerate() {
            if i > 0 && !self.settings.child_delay.is_zero() {
                tokio::time::sleep(self.settings.child_delay).await;
            }

            match self.register_feed(&child).await {
                Ok(true) => expansion.new_feeds_added.push(child.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(child = %child, error = %e, "Failed to add child sitemap to feed list");
                    expansion.error_count += 1;
                    continue;
                }
            }

            match self.check_feed(child.clone(), force_update, depth + 1).await {
                CheckOutcome::Updated { new_urls, .. } => {
                    expansion.success_count += 1;
                    expansion.new_urls.extend(new_urls);
                }
                // A same-day diff was already reported by the check that produced it
                CheckOutcome::Skipped { .. } => expansion.success_count += 1,
                CheckOutcome::Index(nested) => {
                    if nested.success {
                        expansion.success_count += 1;
                    } else {
                        expansion.error_count += 1;
                    }
                    expansion.new_urls.extend(nested.new_urls);
                    expansion.new_feeds_added.extend(nested.new_feeds_added);
                }
                CheckOutcome::Failed(e) => {
                    tracing::warn!(child = %child, error = %e, "Child sitemap check failed");
                    expansion.error_count += 1;
                }
            }
        }

        expansion.success = expansion.success_count > 0;
        if !expansion.success {
            expansion.error_msg = Some(format!(
                "All {} child sitemaps failed",
                expansion.sub_sitemap_count
            ));
        }

        tracing::info!(
            index = %index_url,
            succeeded = expansion.success_count,
            failed = expansion.error_count,
            new_urls = expansion.new_urls.len(),
            "Sitemap index expanded"
        );
        expansion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::{HttpFetcher, DEFAULT_USER_AGENT};
    use crate::storage::MemoryStore;
    use crate::util::FixedClock;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn urlset(locs: &[&str]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        );
        for loc in locs {
            xml.push_str(&format!("\n  <url><loc>{loc}</loc></url>"));
        }
        xml.push_str("\n</urlset>");
        xml
    }

    fn index(children: &[&str]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        );
        for child in children {
            xml.push_str(&format!("\n  <sitemap><loc>{child}</loc></sitemap>"));
        }
        xml.push_str("\n</sitemapindex>");
        xml
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    struct Harness {
        server: MockServer,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        manager: FeedManager,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_depth(3).await
        }

        async fn with_depth(max_index_depth: usize) -> Self {
            let server = MockServer::start().await;
            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(FixedClock::new(day(1)));
            let fetcher =
                HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap();
            let manager = FeedManager::new(store.clone(), Arc::new(fetcher))
                .with_clock(clock.clone())
                .with_settings(ManagerSettings {
                    child_delay: Duration::ZERO,
                    max_index_depth,
                    max_sitemap_bytes: 1024 * 1024,
                });
            Self {
                server,
                store,
                clock,
                manager,
            }
        }

        fn url(&self, p: &str) -> String {
            format!("{}{}", self.server.uri(), p)
        }

        async fn serve(&self, p: &str, body: &str) {
            Mock::given(method("GET"))
                .and(path(p.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
                .mount(&self.server)
                .await;
        }
    }

    #[tokio::test]
    async fn test_first_download_stores_without_diff() {
        let h = Harness::new().await;
        let body = urlset(&["https://a.example/1"]);
        h.serve("/sitemap.xml", &body).await;
        let url = h.url("/sitemap.xml");

        let outcome = h.manager.download_and_save(&url, false).await;
        match &outcome {
            CheckOutcome::Updated {
                new_urls,
                archive_key,
                first_check,
            } => {
                assert!(new_urls.is_empty());
                assert!(*first_check);
                assert_eq!(archive_key, &FeedKey::from_url(&url).archive(day(1)));
            }
            other => panic!("Expected Updated, got {other:?}"),
        }

        assert_eq!(h.manager.get_content(&url, ContentKind::Current).await, Some(body.clone()));
        assert_eq!(h.manager.get_content(&url, ContentKind::Previous).await, None);
        assert_eq!(
            h.manager.get_content(&url, ContentKind::Archive(day(1))).await,
            Some(body)
        );
        assert_eq!(h.manager.last_checked(&url).await, Some(day(1)));
    }

    #[tokio::test]
    async fn test_next_day_reports_added_url_and_rotates() {
        let h = Harness::new().await;
        let url = h.url("/sitemap.xml");
        let old = urlset(&["https://a.example/1"]);
        let new = urlset(&["https://a.example/1", "https://a.example/2"]);

        h.serve("/sitemap.xml", &old).await;
        h.manager.download_and_save(&url, false).await;

        h.server.reset().await;
        h.serve("/sitemap.xml", &new).await;
        h.clock.advance_days(1);

        let outcome = h.manager.download_and_save(&url, false).await;
        assert!(matches!(outcome, CheckOutcome::Updated { first_check: false, .. }));
        assert_eq!(outcome.new_urls(), ["https://a.example/2".to_string()]);
        assert_eq!(h.manager.get_content(&url, ContentKind::Previous).await, Some(old.clone()));
        assert_eq!(h.manager.get_content(&url, ContentKind::Current).await, Some(new));
        // yesterday's archive is untouched
        assert_eq!(
            h.manager.get_content(&url, ContentKind::Archive(day(1))).await,
            Some(old)
        );
        assert_eq!(h.manager.archive_dates(&url, 7).await, vec![day(2), day(1)]);
    }

    #[tokio::test]
    async fn test_same_day_skips_fetch_and_returns_pending_diff() {
        let h = Harness::new().await;
        let url = h.url("/sitemap.xml");
        h.serve("/sitemap.xml", &urlset(&["https://a.example/1"])).await;
        h.manager.download_and_save(&url, false).await;

        h.clock.advance_days(1);
        h.server.reset().await;
        let today = urlset(&["https://a.example/1", "https://a.example/2"]);
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(today.clone()))
            .expect(1)
            .mount(&h.server)
            .await;

        h.manager.download_and_save(&url, false).await;
        let keys_before = h.store.keys();

        let again = h.manager.download_and_save(&url, false).await;
        match &again {
            CheckOutcome::Skipped { new_urls } => {
                assert_eq!(new_urls, &vec!["https://a.example/2".to_string()]);
            }
            other => panic!("Expected Skipped, got {other:?}"),
        }
        assert_eq!(h.store.keys(), keys_before);
        assert_eq!(h.manager.get_content(&url, ContentKind::Current).await, Some(today));
    }

    #[tokio::test]
    async fn test_same_day_without_previous_is_empty_skip() {
        let h = Harness::new().await;
        let url = h.url("/sitemap.xml");
        h.serve("/sitemap.xml", &urlset(&["https://a.example/1"])).await;
        h.manager.download_and_save(&url, false).await;

        let again = h.manager.download_and_save(&url, false).await;
        assert!(again.is_skipped());
        assert!(again.new_urls().is_empty());
    }

    #[tokio::test]
    async fn test_force_update_refetches_same_day() {
        let h = Harness::new().await;
        let url = h.url("/sitemap.xml");
        let first = urlset(&["https://a.example/1"]);
        h.serve("/sitemap.xml", &first).await;
        h.manager.download_and_save(&url, false).await;

        h.server.reset().await;
        h.serve("/sitemap.xml", &urlset(&["https://a.example/1", "https://a.example/3"]))
            .await;

        let forced = h.manager.download_and_save(&url, true).await;
        assert_eq!(forced.new_urls(), ["https://a.example/3".to_string()]);
        assert_eq!(h.manager.get_content(&url, ContentKind::Previous).await, Some(first));
    }

    #[tokio::test]
    async fn test_http_error_leaves_store_untouched() {
        let h = Harness::new().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.server)
            .await;
        let url = h.url("/sitemap.xml");

        let outcome = h.manager.download_and_save(&url, false).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), "HTTP 503");
        assert!(outcome.new_urls().is_empty());
        assert!(h.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_gzip_sitemap_is_decompressed() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let h = Harness::new().await;
        let body = urlset(&["https://a.example/gz"]);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(enc.finish().unwrap()))
            .mount(&h.server)
            .await;
        let url = h.url("/sitemap.xml.gz");

        let outcome = h.manager.download_and_save(&url, false).await;
        assert!(outcome.is_success());
        assert_eq!(h.manager.get_content(&url, ContentKind::Current).await, Some(body));
    }

    #[tokio::test]
    async fn test_corrupt_gzip_fails() {
        let h = Harness::new().await;
        h.serve("/sitemap.xml.gz", "plain text pretending to be gzip").await;
        let outcome = h.manager.download_and_save(&h.url("/sitemap.xml.gz"), false).await;
        assert!(matches!(
            outcome,
            CheckOutcome::Failed(CheckError::Fetch(crate::feed::FetchError::Decompress(_)))
        ));
    }

    #[tokio::test]
    async fn test_store_write_failure_is_failed_outcome() {
        let h = Harness::new().await;
        h.serve("/sitemap.xml", &urlset(&["https://a.example/1"])).await;
        h.store.set_fail_writes(true);

        let outcome = h.manager.download_and_save(&h.url("/sitemap.xml"), false).await;
        assert!(matches!(outcome, CheckOutcome::Failed(CheckError::Store(_))));
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_first_check() {
        let h = Harness::new().await;
        let url = h.url("/sitemap.xml");
        h.serve("/sitemap.xml", &urlset(&["https://a.example/1"])).await;
        h.manager.download_and_save(&url, false).await;

        h.store.set_fail_reads(true);
        assert!(h.manager.list_feeds().await.is_empty());
        assert_eq!(h.manager.get_content(&url, ContentKind::Current).await, None);

        // last_update is unreadable, so the day guard cannot fire either
        let outcome = h.manager.download_and_save(&url, false).await;
        assert!(matches!(outcome, CheckOutcome::Updated { first_check: true, .. }));
    }

    #[tokio::test]
    async fn test_index_expansion_adds_children_and_unions_new_urls() {
        let h = Harness::new().await;
        let index_url = h.url("/index.xml");
        let posts_url = h.url("/posts.xml");
        h.serve("/index.xml", &index(&[&posts_url, "/pages.xml"])).await;
        h.serve("/posts.xml", &urlset(&["https://a.example/p1"])).await;
        h.serve("/pages.xml", &urlset(&["https://a.example/about"])).await;

        let first = h.manager.download_and_save(&index_url, false).await;
        let CheckOutcome::Index(expansion) = first else {
            panic!("Expected index outcome");
        };
        assert!(expansion.success);
        assert_eq!(expansion.sub_sitemap_count, 2);
        assert_eq!(expansion.success_count, 2);
        assert_eq!(expansion.error_count, 0);
        assert!(expansion.new_urls.is_empty());
        assert_eq!(expansion.new_feeds_added, vec![posts_url.clone(), h.url("/pages.xml")]);
        assert_eq!(h.manager.list_feeds().await, vec![posts_url, h.url("/pages.xml")]);

        h.clock.advance_days(1);
        h.server.reset().await;
        h.serve("/index.xml", &index(&[&h.url("/posts.xml"), "/pages.xml"])).await;
        h.serve("/posts.xml", &urlset(&["https://a.example/p1", "https://a.example/p2"]))
            .await;
        h.serve("/pages.xml", &urlset(&["https://a.example/about", "https://a.example/team"]))
            .await;

        let second = h.manager.download_and_save(&index_url, false).await;
        assert_eq!(
            second.new_urls(),
            ["https://a.example/p2".to_string(), "https://a.example/team".to_string()]
        );
        if let CheckOutcome::Index(expansion) = second {
            assert!(expansion.new_feeds_added.is_empty());
        }
    }

    #[tokio::test]
    async fn test_index_counts_failed_children() {
        let h = Harness::new().await;
        h.serve("/index.xml", &index(&["/ok.xml", "/missing.xml"])).await;
        h.serve("/ok.xml", &urlset(&["https://a.example/1"])).await;
        Mock::given(method("GET"))
            .and(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.server)
            .await;

        let expansion = h
            .manager
            .expand_index(&h.url("/index.xml"), &index(&["/ok.xml", "/missing.xml"]))
            .await;
        assert!(expansion.success);
        assert_eq!(expansion.success_count, 1);
        assert_eq!(expansion.error_count, 1);
        // failed children are still monitored so later passes retry them
        assert_eq!(h.manager.list_feeds().await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_index_fails() {
        let h = Harness::new().await;
        h.serve("/index.xml", &index(&[])).await;
        let outcome = h.manager.download_and_save(&h.url("/index.xml"), false).await;
        assert!(outcome.is_index());
        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), "Sitemap index lists no child sitemaps");
    }

    #[tokio::test]
    async fn test_self_referencing_index_stops_at_depth_limit() {
        let h = Harness::with_depth(1).await;
        h.serve("/index.xml", &index(&["/index.xml"])).await;

        let outcome = h.manager.download_and_save(&h.url("/index.xml"), false).await;
        let CheckOutcome::Index(expansion) = outcome else {
            panic!("Expected index outcome");
        };
        assert!(!expansion.success);
        assert_eq!(expansion.error_count, 1);
    }

    #[tokio::test]
    async fn test_add_feed_registers_only_on_success() {
        let h = Harness::new().await;
        h.serve("/good.xml", &urlset(&["https://a.example/1"])).await;
        Mock::given(method("GET"))
            .and(path("/bad.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let good = h.manager.add_feed(&h.url("/good.xml"), false).await;
        assert!(good.added);
        let bad = h.manager.add_feed(&h.url("/bad.xml"), false).await;
        assert!(!bad.added);
        assert!(!bad.outcome.is_success());

        assert_eq!(h.manager.list_feeds().await, vec![h.url("/good.xml")]);
    }

    #[tokio::test]
    async fn test_add_existing_feed_is_not_duplicated() {
        let h = Harness::new().await;
        h.serve("/good.xml", &urlset(&["https://a.example/1"])).await;

        h.manager.add_feed(&h.url("/good.xml"), false).await;
        let again = h.manager.add_feed(&h.url("/good.xml"), true).await;
        assert!(!again.added);
        assert!(again.outcome.is_success());
        assert_eq!(h.manager.list_feeds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_index_reports_children() {
        let h = Harness::new().await;
        h.serve("/index.xml", &index(&["/a.xml"])).await;
        h.serve("/a.xml", &urlset(&["https://a.example/1"])).await;

        let added = h.manager.add_feed(&h.url("/index.xml"), false).await;
        assert!(added.added);
        assert!(added.is_index());
        assert_eq!(added.sub_sitemaps(), Some(1));
        assert_eq!(added.new_feeds_added(), [h.url("/a.xml")]);
        // child registered by the expansion, index appended after it
        assert_eq!(
            h.manager.list_feeds().await,
            vec![h.url("/a.xml"), h.url("/index.xml")]
        );
    }

    #[tokio::test]
    async fn test_add_feed_rejects_bad_url() {
        let h = Harness::new().await;
        let result = h.manager.add_feed("file:///etc/passwd", false).await;
        assert!(!result.added);
        assert!(matches!(result.outcome, CheckOutcome::Failed(CheckError::InvalidUrl(_))));
        assert!(h.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_remove_feed() {
        let h = Harness::new().await;
        h.serve("/good.xml", &urlset(&["https://a.example/1"])).await;
        h.manager.add_feed(&h.url("/good.xml"), false).await;

        assert!(matches!(
            h.manager.remove_feed("https://never.example/sitemap.xml").await,
            Err(RemoveError::NotFound(_))
        ));
        assert_eq!(h.manager.list_feeds().await.len(), 1);

        h.manager.remove_feed(&h.url("/good.xml")).await.unwrap();
        assert!(h.manager.list_feeds().await.is_empty());
        // snapshots outlive the membership
        assert!(h
            .manager
            .get_content(&h.url("/good.xml"), ContentKind::Current)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_remove_during_read_outage_keeps_list() {
        let h = Harness::new().await;
        h.serve("/a.xml", &urlset(&["https://a.example/1"])).await;
        h.serve("/b.xml", &urlset(&["https://a.example/2"])).await;
        h.manager.add_feed(&h.url("/a.xml"), false).await;
        h.manager.add_feed(&h.url("/b.xml"), false).await;

        h.store.set_fail_reads(true);
        let err = h.manager.remove_feed(&h.url("/a.xml")).await.unwrap_err();
        assert!(matches!(err, RemoveError::Store(_)));
        h.store.set_fail_reads(false);

        assert_eq!(
            h.manager.list_feeds().await,
            vec![h.url("/a.xml"), h.url("/b.xml")]
        );
    }

    #[tokio::test]
    async fn test_index_children_not_registered_during_read_outage() {
        let h = Harness::new().await;
        h.serve("/a.xml", &urlset(&["https://a.example/1"])).await;
        h.serve("/b.xml", &urlset(&["https://a.example/2"])).await;
        h.serve("/c.xml", &urlset(&["https://a.example/3"])).await;
        h.manager.add_feed(&h.url("/a.xml"), false).await;

        h.store.set_fail_reads(true);
        let expansion = h
            .manager
            .expand_index(&h.url("/index.xml"), &index(&["/b.xml", "/c.xml"]))
            .await;
        h.store.set_fail_reads(false);

        assert!(!expansion.success);
        assert_eq!(expansion.error_count, 2);
        assert!(expansion.new_feeds_added.is_empty());
        assert_eq!(h.manager.list_feeds().await, vec![h.url("/a.xml")]);
    }

    #[tokio::test]
    async fn test_corrupt_feed_list_is_not_overwritten() {
        let h = Harness::new().await;
        h.serve("/a.xml", &urlset(&["https://a.example/1"])).await;
        h.store.put(FEEDS_KEY, "{not json").await.unwrap();

        let result = h.manager.add_feed(&h.url("/a.xml"), false).await;
        assert!(!result.added);
        assert!(matches!(result.outcome, CheckOutcome::Failed(CheckError::Store(_))));
        assert_eq!(h.store.get(FEEDS_KEY).await.unwrap().as_deref(), Some("{not json"));
    }

    /// Treats every non-blank line as a location.
    struct LineExtractor;

    impl SitemapExtractor for LineExtractor {
        fn locations(&self, xml: &str) -> Vec<String> {
            xml.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect()
        }

        fn url_entries(&self, _xml: &str) -> Vec<crate::sitemap::UrlEntry> {
            Vec::new()
        }

        fn child_sitemaps(&self, _xml: &str) -> Vec<String> {
            Vec::new()
        }

        fn classify_root(&self, _xml: &str) -> RootKind {
            RootKind::UrlSet
        }

        fn is_valid_sitemap(&self, _xml: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_custom_extractor_drives_diff() {
        let h = Harness::new().await;
        let manager = h.manager.clone().with_extractor(Arc::new(LineExtractor));
        assert_eq!(manager.extractor().locations("x\n\n y \n"), vec!["x", "y"]);

        let url = h.url("/list.txt");
        h.serve("/list.txt", "https://a.example/1\n").await;
        manager.download_and_save(&url, false).await;

        h.server.reset().await;
        h.serve("/list.txt", "https://a.example/1\nhttps://a.example/2\n").await;
        h.clock.advance_days(1);

        let outcome = manager.download_and_save(&url, false).await;
        assert_eq!(outcome.new_urls(), ["https://a.example/2".to_string()]);
    }

    #[tokio::test]
    async fn test_relative_children_resolve_against_origin() {
        let h = Harness::new().await;
        h.serve("/sitemaps/index.xml", &index(&["posts.xml"])).await;
        h.serve("/posts.xml", &urlset(&["https://a.example/1"])).await;

        let outcome = h
            .manager
            .download_and_save(&h.url("/sitemaps/index.xml"), false)
            .await;
        assert!(outcome.is_success());
        assert_eq!(h.manager.list_feeds().await, vec![h.url("/posts.xml")]);
    }

    #[tokio::test]
    async fn test_corrupt_feed_list_reads_as_empty() {
        let h = Harness::new().await;
        h.store.put(FEEDS_KEY, "{not json").await.unwrap();
        assert!(h.manager.list_feeds().await.is_empty());

        h.store
            .put(FEEDS_KEY, r#"["https://a.example/s.xml","https://a.example/s.xml"]"#)
            .await
            .unwrap();
        assert_eq!(h.manager.list_feeds().await, vec!["https://a.example/s.xml"]);
    }
}

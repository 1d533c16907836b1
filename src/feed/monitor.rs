use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::manager::FeedManager;
use super::types::{ChangeBatch, ChangeEntry, CheckOutcome, FeedFailure};
use crate::util::domain_of;

/// Pause between consecutive feeds in a pass.
pub const DEFAULT_FEED_DELAY: Duration = Duration::from_secs(2);

/// Checks every monitored feed once, in order, and collects the changes.
///
/// Feeds are processed strictly one after another with `feed_delay` between
/// them. A failing feed is logged and recorded in `failures`; it never stops
/// the remaining feeds from being checked. Feeds already checked today are
/// counted as skipped and left out of the batch, so a scheduled pass does not
/// notify the same diff twice.
pub async fn run_check_pass(manager: &FeedManager, feed_delay: Duration) -> ChangeBatch {
    let feeds = manager.list_feeds().await;
    let mut batch = ChangeBatch::default();

    if feeds.is_empty() {
        tracing::info!("No feeds to check");
        return batch;
    }

    tracing::info!(feeds = feeds.len(), "Starting check pass");

    for (i, url) in feeds.iter().enumerate() {
        if i > 0 && !feed_delay.is_zero() {
            tokio::time::sleep(feed_delay).await;
        }

        let result = manager.add_feed(url, false).await;
        batch.checked += 1;

        match &result.outcome {
            CheckOutcome::Skipped { .. } => {
                tracing::debug!(feed = %url, "Skipped, already checked today");
                batch.skipped += 1;
            }
            outcome if !outcome.is_success() => {
                let transient = outcome.error().is_some_and(|e| e.is_transient());
                tracing::warn!(
                    feed = %url,
                    error = %outcome.message(),
                    transient = transient,
                    "Feed check failed"
                );
                batch.failures.push(FeedFailure {
                    url: url.clone(),
                    error: outcome.message(),
                    transient,
                });
            }
            outcome if outcome.new_urls().is_empty() => {
                tracing::debug!(feed = %url, "No new URLs");
            }
            outcome => {
                tracing::info!(feed = %url, new_urls = outcome.new_urls().len(), "New URLs found");
                batch.entries.push(ChangeEntry {
                    url: url.clone(),
                    domain: domain_of(url),
                    message: outcome.message(),
                    new_urls: outcome.new_urls().to_vec(),
                    archive_key: outcome.archive_key().map(str::to_owned),
                    is_index: outcome.is_index(),
                });
            }
        }
    }

    tracing::info!(
        checked = batch.checked,
        changed = batch.entries.len(),
        skipped = batch.skipped,
        failed = batch.failures.len(),
        new_urls = batch.total_new_urls(),
        "Check pass complete"
    );
    batch
}

/// Runs [`run_check_pass`] every `interval`, handing each batch to `on_batch`.
///
/// Passes never overlap: a pass that overruns the interval delays the next
/// tick instead of stacking another pass behind it. Runs until the task is
/// dropped.
pub async fn watch<F>(manager: &FeedManager, feed_delay: Duration, interval: Duration, mut on_batch: F)
where
    F: FnMut(ChangeBatch),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let batch = run_check_pass(manager, feed_delay).await;
        on_batch(batch);
    }
}

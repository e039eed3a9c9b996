use crate::bus::EventBus;
use crate::feed::fetcher::{CacheHints, FeedSource, FetchOutcome};
use crate::feed::parser::FeedEntry;
use crate::scheduler::{Cadence, ScheduledJob, Scheduler};
use crate::util::FeedUrl;
use chrono::{DateTime, Utc};

/// Event type under which every new feed entry is fired.
pub const EVENT_FEEDREADER: &str = "feedreader";

/// Polls a single feed and fires its new entries on the event bus.
///
/// An entry is new when its published timestamp is strictly later than the
/// watermark (`last_entry_timestamp`). The watermark starts at the Unix epoch,
/// so the first successful fetch publishes every dated entry in the feed.
///
/// After each well-formed, non-empty fetch the watermark is set to the
/// timestamp of the *first* entry the feed lists, whether or not that entry
/// was new and even if the feed is not ordered newest-first.
pub struct FeedManager<S> {
    url: FeedUrl,
    source: S,
    bus: EventBus,
    last_entry_timestamp: DateTime<Utc>,
    cache_hints: Option<CacheHints>,
}

impl<S: FeedSource> FeedManager<S> {
    /// Creates a manager without fetching anything yet.
    pub fn new(url: FeedUrl, source: S, bus: EventBus) -> Self {
        Self {
            url,
            source,
            bus,
            last_entry_timestamp: DateTime::UNIX_EPOCH,
            cache_hints: None,
        }
    }

    /// Creates a manager, fetches the feed once, then hands the manager to
    /// `scheduler` to be updated at the top of every hour.
    pub async fn initialize(url: FeedUrl, source: S, bus: EventBus, scheduler: &Scheduler) {
        let mut manager = Self::new(url, source, bus);
        tracing::debug!(feed = %manager.url, "Loading feed");
        manager.update().await;
        scheduler.register(Cadence::hourly(), manager);
    }

    pub fn url(&self) -> &FeedUrl {
        &self.url
    }

    pub fn last_entry_timestamp(&self) -> DateTime<Utc> {
        self.last_entry_timestamp
    }

    pub fn cache_hints(&self) -> Option<&CacheHints> {
        self.cache_hints.as_ref()
    }

    /// Fetches the feed and publishes any new entries.
    ///
    /// Never fails: fetch and parse errors are logged and the watermark is
    /// left untouched until the next update.
    pub async fn update(&mut self) {
        tracing::info!(feed = %self.url, "Fetching new data from feed");
        let outcome = self
            .source
            .fetch(self.url.url(), self.cache_hints.as_ref())
            .await;
        self.cache_hints = outcome.hints().cloned();

        match outcome {
            FetchOutcome::FetchFailed(e) => {
                tracing::error!(feed = %self.url, error = %e, "Error fetching feed data");
            }
            FetchOutcome::ParseFailed { reason, entries, .. } => {
                tracing::error!(
                    feed = %self.url,
                    error = %reason,
                    discarded = entries.len(),
                    "Error parsing feed"
                );
            }
            FetchOutcome::ParseOk { entries, .. } => {
                // With conditional fetch hints an unchanged feed comes back empty
                let Some(first) = entries.first() else {
                    self.log_no_entries();
                    return;
                };
                tracing::debug!(feed = %self.url, entries = entries.len(), "Entries available in feed");
                self.publish_new_entries(&entries);
                if let Some(published) = first.published {
                    self.last_entry_timestamp = published;
                }
            }
        }
    }

    /// Fires every entry newer than the watermark, in feed order.
    /// Returns how many were fired.
    fn publish_new_entries(&self, entries: &[FeedEntry]) -> usize {
        let mut published = 0;
        for entry in entries {
            let is_new = entry
                .published
                .is_some_and(|ts| ts > self.last_entry_timestamp);
            if is_new {
                self.bus.fire(EVENT_FEEDREADER, entry.to_payload(self.url.as_str()));
                published += 1;
            }
        }

        if published == 0 {
            self.log_no_entries();
        } else {
            tracing::debug!(feed = %self.url, published, "Published new entries");
        }
        published
    }

    fn log_no_entries(&self) {
        tracing::debug!(feed = %self.url, "No new entries in feed");
    }
}

impl<S: FeedSource> ScheduledJob for FeedManager<S> {
    async fn run(&mut self, now: DateTime<Utc>) {
        tracing::trace!(feed = %self.url, %now, "Scheduled feed update");
        self.update().await;
    }
}

//! Feed polling: fetching, parsing, and publishing new entries.
//!
//! - [`parser`] - Converts RSS/Atom/JSON Feed documents into [`FeedEntry`] values using `feed-rs`
//! - [`fetcher`] - The [`FeedSource`] capability and its conditional-GET HTTP implementation
//! - [`manager`] - [`FeedManager`], which keeps the per-feed watermark and fires new entries
//!
//! # Example
//!
//! ```ignore
//! use feedreader::feed::{FeedManager, HttpFeedSource};
//!
//! let source = HttpFeedSource::new(reqwest::Client::new());
//! FeedManager::initialize(url, source, bus.clone(), &scheduler).await;
//! ```

mod fetcher;
mod manager;
mod parser;

pub use fetcher::{
    CacheHints, FeedSource, FetchError, FetchOutcome, HttpFeedSource, DEFAULT_MAX_FEED_SIZE,
    DEFAULT_TIMEOUT,
};
pub use manager::{FeedManager, EVENT_FEEDREADER};
pub use parser::{parse_feed, FeedEntry};

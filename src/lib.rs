//! Polls RSS/Atom feeds and republishes newly seen entries on an in-process
//! event bus.
//!
//! One [`feed::FeedManager`] is created per configured URL by [`setup`]. Each
//! fetches its feed at startup and again at the top of every hour, firing a
//! `feedreader` event for every entry published after the newest one it has
//! already seen.

pub mod bus;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod util;

mod setup;

pub use setup::setup;

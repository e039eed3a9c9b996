use crate::bus::EventBus;
use crate::config::FeedReaderConfig;
use crate::feed::{FeedManager, FeedSource};
use crate::scheduler::Scheduler;

/// Starts one [`FeedManager`] per configured URL.
///
/// Each manager fetches its feed once before the next one is created, then
/// is scheduled hourly. Returns `true` if at least one manager was started.
/// A feed that cannot be reached still counts: its manager keeps retrying
/// every hour and logs the failures.
pub async fn setup<S>(
    config: &FeedReaderConfig,
    source: &S,
    bus: &EventBus,
    scheduler: &Scheduler,
) -> bool
where
    S: FeedSource + Clone,
{
    let mut started = 0usize;
    for url in &config.urls {
        FeedManager::initialize(url.clone(), source.clone(), bus.clone(), scheduler).await;
        started += 1;
    }

    if started == 0 {
        tracing::warn!("No feed URLs configured");
    } else {
        tracing::info!(feeds = started, "Feed reader started");
    }
    started > 0
}

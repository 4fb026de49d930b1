//! Background snapshot refresh.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::board::cache::SnapshotCache;

/// Refresh the cache every `interval`, starting immediately. A tick that
/// finds a fetch already running is skipped. Failures are logged and the
/// loop carries on.
pub fn spawn_poller(cache: SnapshotCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match cache.try_refresh().await {
                None => debug!("poll skipped, refresh already in flight"),
                Some(Ok(snapshot)) => {
                    debug!(cards = snapshot.card_count(), "poll refreshed snapshot")
                }
                Some(Err(err)) => warn!(error = %err, kind = ?err.kind(), "poll refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::cache::testing::{ManualClock, StaticSource};
    use crate::board::fixtures::snapshot;
    use crate::errors::BoardApiError;
    use std::sync::Arc;

    fn cache_over(source: Arc<StaticSource>) -> SnapshotCache {
        SnapshotCache::new(source, Arc::new(ManualClock::new(0)), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_poller_refreshes_repeatedly() {
        let source = Arc::new(StaticSource::new(snapshot(vec![], vec![], vec![])));
        let cache = cache_over(source.clone());

        let handle = spawn_poller(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(source.count() >= 2);
        assert!(cache.peek().is_some());
    }

    #[tokio::test]
    async fn test_poller_survives_failures() {
        let source = Arc::new(StaticSource::new(snapshot(vec![], vec![], vec![])));
        *source.fail_with.lock().unwrap() = Some(BoardApiError::RateLimited);
        let cache = cache_over(source.clone());

        let handle = spawn_poller(cache.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        assert!(cache.peek().is_none());

        *source.fail_with.lock().unwrap() = None;
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        assert!(cache.peek().is_some());
    }
}

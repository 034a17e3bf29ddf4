use crate::ResponseCache;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to the background task that periodically purges expired entries.
///
/// Dropping the handle stops the sweeper as well, so it never outlives the
/// service that owns it.
#[derive(Debug)]
pub struct CacheSweeper {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawn the sweeper on the current tokio runtime.
    pub fn spawn<V>(cache: Arc<ResponseCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + 'static,
    {
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            // first tick completes immediately
            ticker.tick().await;
            info!(?interval, "cache sweeper started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let removed = cache.cleanup_expired();
                        if removed > 0 {
                            info!(removed, "cache cleanup removed expired entries");
                        } else {
                            debug!("cache cleanup found nothing to remove");
                        }
                    }
                }
            }
            info!("cache sweeper stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let cache = Arc::new(ResponseCache::new(10, Duration::from_secs(60)));
        cache.set_with_ttl("a", 1u8, Duration::ZERO);
        cache.set("b", 2u8);

        let sweeper =
            CacheSweeper::spawn(cache.clone(), Duration::from_secs(300));
        // Zero ttl entries expire as soon as any time has passed.
        std::thread::sleep(Duration::from_millis(2));
        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired_cleanups, 1);

        sweeper.shutdown().await;
    }
}

//! Composition root: everything the scraping backend needs, built from
//! [`Settings`].
use crate::cached::CachedScraper;
use harvest_cache::{CacheSweeper, ResponseCache};
use harvest_config::{
    config::QueueSettings,
    http::RequestExecutor,
    proxy::ProxyPool,
    Settings,
};
use harvest_queue::{QueueError, QueueOptions, SharedScraper, TaskQueue};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub fn queue_options(settings: &QueueSettings) -> QueueOptions {
    QueueOptions {
        max_retries: settings.max_retries,
        idle_delay: settings.idle_delay(),
        workers: settings.workers,
        task_timeout: settings.task_timeout(),
        auto_start: settings.auto_start,
    }
}

pub struct ScrapeService {
    settings: Settings,
    proxies: Arc<ProxyPool>,
    executor: Arc<RequestExecutor>,
    cache: Arc<ResponseCache<Value>>,
    sweeper: Option<CacheSweeper>,
    queue: TaskQueue,
}

impl ScrapeService {
    /// Build the proxy pool, executor, cache and queue. `make_scraper`
    /// receives the shared executor; its scraper is wrapped in a
    /// [`CachedScraper`] when the cache is enabled.
    ///
    /// Must be called inside a tokio runtime (the cache sweeper and the
    /// queue workers are spawned on it).
    pub fn from_settings<F>(settings: Settings, make_scraper: F) -> Result<Self, QueueError>
    where
        F: FnOnce(Arc<RequestExecutor>) -> SharedScraper,
    {
        tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let proxies = Arc::new(ProxyPool::from_config(&settings.proxy));
        let executor = Arc::new(RequestExecutor::new(
            (&settings.http).into(),
            proxies.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(
            settings.cache.max_size,
            settings.cache.ttl(),
        ));

        let scraper = make_scraper(executor.clone());
        let (scraper, sweeper): (SharedScraper, _) = if settings.cache.enabled {
            let sweeper = CacheSweeper::spawn(cache.clone(), settings.cache.cleanup_interval());
            (
                Arc::new(CachedScraper::new(scraper, cache.clone())),
                Some(sweeper),
            )
        } else {
            (scraper, None)
        };

        let queue = TaskQueue::new(scraper, queue_options(&settings.queue));
        info!(
            proxies = proxies.len(),
            cache = settings.cache.enabled,
            workers = settings.queue.workers,
            "scrape service ready"
        );

        Ok(Self {
            settings,
            proxies,
            executor,
            cache,
            sweeper,
            queue,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Value>> {
        &self.cache
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Stop queue workers and the cache sweeper.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
        if let Some(sweeper) = self.sweeper {
            sweeper.shutdown().await;
        }
        info!("scrape service stopped");
    }
}

//! Read-through cache around a scraper.
use async_trait::async_trait;
use harvest_cache::{cache_key, ResponseCache};
use harvest_queue::{ScrapeError, ScrapeJob, Scraper};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

const OPERATION: &str = "scrape_product";

/// Serves repeated `(url, affiliate_link)` jobs from a [`ResponseCache`].
/// Only successful, non-null results are stored.
pub struct CachedScraper<S> {
    inner: S,
    cache: Arc<ResponseCache<Value>>,
    ttl: Option<Duration>,
}

impl<S: Scraper> CachedScraper<S> {
    pub fn new(inner: S, cache: Arc<ResponseCache<Value>>) -> Self {
        Self {
            inner,
            cache,
            ttl: None,
        }
    }

    /// Override the cache default TTL for stored results.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Value>> {
        &self.cache
    }

    pub fn key_for(job: &ScrapeJob) -> Option<String> {
        match cache_key(OPERATION, &[&job.url, &job.affiliate_link], &json!({})) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(url = %job.url, "cannot derive cache key: {err}");
                None
            }
        }
    }
}

#[async_trait]
impl<S: Scraper> Scraper for CachedScraper<S> {
    async fn scrape(&self, job: &ScrapeJob) -> Result<Value, ScrapeError> {
        let Some(key) = Self::key_for(job) else {
            return self.inner.scrape(job).await;
        };

        if let Some(hit) = self.cache.get(&key) {
            debug!(url = %job.url, "cache hit");
            return Ok(hit);
        }

        debug!(url = %job.url, "cache miss");
        let result = self.inner.scrape(job).await?;
        if !result.is_null() {
            match self.ttl {
                Some(ttl) => self.cache.set_with_ttl(&key, result.clone(), ttl),
                None => self.cache.set(&key, result.clone()),
            }
        }
        Ok(result)
    }
}

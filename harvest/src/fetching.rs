//! Scraper that fetches the page itself and delegates parsing.
use async_trait::async_trait;
use harvest_config::http::{HttpResponse, RequestExecutor};
use harvest_queue::{ScrapeError, ScrapeJob, Scraper};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Turns a fetched page into a product record. HTML selectors live here.
pub trait ProductExtractor: Send + Sync {
    fn extract(&self, job: &ScrapeJob, page: &HttpResponse) -> Result<Value, ScrapeError>;
}

impl<F> ProductExtractor for F
where
    F: Fn(&ScrapeJob, &HttpResponse) -> Result<Value, ScrapeError> + Send + Sync,
{
    fn extract(&self, job: &ScrapeJob, page: &HttpResponse) -> Result<Value, ScrapeError> {
        self(job, page)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Proxy rotation and block detection.
    #[default]
    Direct,
    /// Through the JavaScript rendering API.
    RenderingApi,
}

pub struct FetchingScraper<E> {
    executor: Arc<RequestExecutor>,
    extractor: E,
    mode: FetchMode,
}

impl<E: ProductExtractor> FetchingScraper<E> {
    pub fn new(executor: Arc<RequestExecutor>, extractor: E) -> Self {
        Self {
            executor,
            extractor,
            mode: FetchMode::Direct,
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, ScrapeError> {
        let page = match self.mode {
            FetchMode::Direct => self.executor.execute(url).await,
            FetchMode::RenderingApi => self.executor.execute_via_rendering_api(url).await,
        };
        page.map_err(|err| {
            error!(url, "fetch failed: {err}");
            ScrapeError::Fetch(err.to_string())
        })
    }
}

#[async_trait]
impl<E: ProductExtractor> Scraper for FetchingScraper<E> {
    async fn scrape(&self, job: &ScrapeJob) -> Result<Value, ScrapeError> {
        let page = self.fetch(&job.url).await?;
        debug!(url = %job.url, status = page.status, bytes = page.body.len(), "page fetched");
        self.extractor.extract(job, &page)
    }
}

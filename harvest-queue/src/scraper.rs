use crate::task::ScrapeJob;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Product not found at {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Turns a job into a product record. The queue only cares whether it
/// succeeds; the payload is stored on the task as-is.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, job: &ScrapeJob) -> Result<serde_json::Value, ScrapeError>;
}

pub type SharedScraper = Arc<dyn Scraper>;

#[async_trait]
impl<S: Scraper + ?Sized> Scraper for Arc<S> {
    async fn scrape(&self, job: &ScrapeJob) -> Result<serde_json::Value, ScrapeError> {
        (**self).scrape(job).await
    }
}

//! Platform tag to scraper mapping.
use async_trait::async_trait;
use harvest_queue::{ScrapeError, ScrapeJob, Scraper, SharedScraper};
use std::{collections::HashMap, sync::Arc};
use tracing::error;

/// Dispatches each job to the scraper registered for its platform. Tags are
/// matched case-insensitively.
#[derive(Default, Clone)]
pub struct ScraperRegistry {
    scrapers: HashMap<String, SharedScraper>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        platform: &str,
        scraper: impl Scraper + 'static,
    ) -> Self {
        self.scrapers
            .insert(platform.to_lowercase(), Arc::new(scraper));
        self
    }

    pub fn get(&self, platform: &str) -> Option<SharedScraper> {
        self.scrapers.get(&platform.to_lowercase()).cloned()
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.scrapers.keys().cloned().collect();
        platforms.sort();
        platforms
    }
}

#[async_trait]
impl Scraper for ScraperRegistry {
    async fn scrape(&self, job: &ScrapeJob) -> Result<serde_json::Value, ScrapeError> {
        let Some(scraper) = self.get(&job.platform) else {
            error!(platform = %job.platform, "no scraper registered");
            return Err(ScrapeError::UnsupportedPlatform(job.platform.clone()));
        };
        scraper.scrape(job).await
    }
}

impl std::fmt::Debug for ScraperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl Scraper for Fixed {
        async fn scrape(
            &self,
            _job: &ScrapeJob,
        ) -> Result<serde_json::Value, ScrapeError> {
            Ok(json!({ "source": self.0 }))
        }
    }

    fn job(platform: &str) -> ScrapeJob {
        ScrapeJob {
            url: "https://example.com/p/1".to_string(),
            affiliate_link: String::new(),
            platform: platform.to_string(),
        }
    }

    #[tokio::test]
    async fn dispatches_by_platform() {
        let registry = ScraperRegistry::new()
            .register("amazon", Fixed("amazon"))
            .register("MercadoLivre", Fixed("ml"));

        assert_eq!(registry.platforms(), vec!["amazon", "mercadolivre"]);
        let value = registry.scrape(&job("AMAZON")).await.unwrap();
        assert_eq!(value["source"], "amazon");
        let value = registry.scrape(&job("mercadolivre")).await.unwrap();
        assert_eq!(value["source"], "ml");
    }

    #[tokio::test]
    async fn unknown_platform() {
        let registry = ScraperRegistry::new().register("amazon", Fixed("amazon"));
        let err = registry.scrape(&job("shopee")).await.unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedPlatform(p) if p == "shopee"));
    }
}

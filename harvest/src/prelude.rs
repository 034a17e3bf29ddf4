pub use crate::cached::CachedScraper;
pub use crate::fetching::{FetchMode, FetchingScraper, ProductExtractor};
pub use crate::platform::detect_platform;
pub use crate::registry::ScraperRegistry;
pub use crate::service::ScrapeService;
pub use harvest_cache::{cache_key, ResponseCache};
pub use harvest_config::{
    http::{HttpResponse, RequestError, RequestExecutor},
    proxy::{ProxyEndpoint, ProxyPool},
    AppConfig, Configurable, Settings,
};
pub use harvest_queue::{
    QueueOptions, QueueOptionsBuilder, ScrapeError, ScrapeJob, Scraper, Task,
    TaskEvent, TaskId, TaskObserver, TaskQueue, TaskStatus,
};

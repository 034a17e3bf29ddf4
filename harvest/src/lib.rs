//! # harvest
//!
//! Task-processing and resilience layer for affiliate product scrapers.
//!
//! Scraping jobs go into a priority [`queue::TaskQueue`] processed by tokio
//! workers, with exponential backoff between retries. Pages are fetched by a
//! [`http::RequestExecutor`] that rotates proxies and user agents and backs
//! off when a site starts blocking, and results can be kept in a TTL/LRU
//! [`cache::ResponseCache`].
//!
//! ## Modules
//!
//! - `cache`: response cache, cache keys and the background sweeper.
//! - `config`: YAML/env configuration, proxy pool and request executor.
//! - `queue`: tasks, priority ordering, workers and retry timers.
//! - `registry`, `cached`, `fetching`: scrapers composed on top of the queue.
//! - `service`: wires everything together from [`config::Settings`].
pub mod cached;
pub mod fetching;
pub mod logging;
pub mod platform;
pub mod prelude;
pub mod registry;
pub mod service;

pub use harvest_cache as cache;
pub use harvest_config as config;
pub use harvest_config::backoff;
pub use harvest_config::http;
pub use harvest_config::reqwest;
pub use harvest_queue as queue;
// re-export
pub use async_trait;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use tracing_subscriber;
pub use uuid;

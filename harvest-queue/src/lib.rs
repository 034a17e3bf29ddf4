//! Priority task queue with retry/backoff for scraping jobs.
pub mod events;
pub mod options;
pub mod priority;
pub mod queue;
pub mod scraper;
pub mod stats;
pub mod task;
mod worker;

pub use crate::events::{TaskEvent, TaskObserver};
pub use crate::options::{QueueOptions, QueueOptionsBuilder, QueueOptionsBuilderError};
pub use crate::priority::PriorityList;
pub use crate::queue::{retry_delay, TaskQueue, MAX_RETRY_DELAY};
pub use crate::scraper::{ScrapeError, Scraper, SharedScraper};
pub use crate::stats::{QueueStats, QueueStatus, WorkerStats};
pub use crate::task::{ScrapeJob, Task, TaskId, TaskStatus, DEFAULT_MAX_RETRIES};
pub use crate::worker::WorkerId;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("No tokio runtime available to run queue workers")]
    NoRuntime,
}

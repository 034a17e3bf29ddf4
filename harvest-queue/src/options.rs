use derive_builder::Builder;
use std::time::Duration;

#[derive(Builder, Clone, Debug)]
#[builder(public, setter(into))]
pub struct QueueOptions {
    /// Used by `add_task_default`.
    #[builder(default = "3")]
    pub max_retries: u32,
    /// Pause before polling an empty queue again.
    #[builder(default = "Duration::from_secs(1)")]
    pub idle_delay: Duration,
    #[builder(default = "1")]
    pub workers: usize,
    #[builder(default = "Duration::from_secs(300)")]
    pub task_timeout: Duration,
    /// Start workers on the first `add_task`.
    #[builder(default = "true")]
    pub auto_start: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            idle_delay: Duration::from_secs(1),
            workers: 1,
            task_timeout: Duration::from_secs(300),
            auto_start: true,
        }
    }
}

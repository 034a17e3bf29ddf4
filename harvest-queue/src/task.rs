use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl TaskStatus {
    /// Completed and failed tasks never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retrying)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a scraper needs to know about a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub url: String,
    pub affiliate_link: String,
    pub platform: String,
}

/// A `Task` is one scraping job tracked by the queue: the page to fetch,
/// where it came from and the lifecycle bookkeeping (timestamps, retries,
/// last error and the produced result).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub affiliate_link: String,
    pub platform: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub priority: i32,
}

impl Task {
    pub fn new(
        url: impl Into<String>,
        affiliate_link: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Task {
            id: TaskId::new(),
            url: url.into(),
            affiliate_link: affiliate_link.into(),
            platform: platform.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
            result: None,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn job(&self) -> ScrapeJob {
        ScrapeJob {
            url: self.url.clone(),
            affiliate_link: self.affiliate_link.clone(),
            platform: self.platform.clone(),
        }
    }

    /// Whether a failed attempt may be retried. `max_retries` counts retries,
    /// not attempts: a task with `max_retries = n` is scraped at most `n + 1`
    /// times and fails with `retry_count == n`.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn set_processing(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn set_completed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.error_message = None;
    }

    pub fn set_retrying(&mut self, err_msg: &str) {
        self.retry_count += 1;
        self.status = TaskStatus::Retrying;
        self.error_message = Some(err_msg.to_string());
    }

    pub fn set_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
    }

    pub fn set_failed(&mut self, err_msg: &str) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(err_msg.to_string());
    }
}

use serde::Serialize;
use std::time::Duration;

/// Aggregate counters kept for the lifetime of the queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub retry_tasks: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct WorkerStats {
    pub total_execution_time: Duration,
    pub tasks_processed: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution_time(&mut self, duration: Duration) {
        self.total_execution_time += duration;
        self.tasks_processed += 1;
    }

    pub fn record_success(&mut self) {
        self.tasks_succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
    }

    pub fn average_execution_time(&self) -> Duration {
        match u32::try_from(self.tasks_processed) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(processed) => self.total_execution_time / processed,
        }
    }
}

/// Snapshot returned by `TaskQueue::get_queue_status`.
#[derive(Clone, Debug, Serialize)]
pub struct QueueStatus {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub processing_tasks: usize,
    pub retrying_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub running: bool,
    pub stats: QueueStats,
    pub workers: Vec<WorkerStats>,
}

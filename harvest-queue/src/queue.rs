//! In-process priority task queue with a retry/backoff state machine.
//!
//! Tasks move `Pending -> Processing -> Completed | Retrying`; a retrying task
//! goes back to `Pending` once its backoff timer fires, or ends up `Failed`
//! when it has no retries left. All state lives behind one mutex that is
//! never held across an `.await`.
use crate::events::{notify, TaskEvent, TaskObserver};
use crate::options::QueueOptions;
use crate::priority::PriorityList;
use crate::scraper::SharedScraper;
use crate::stats::{QueueStats, QueueStatus, WorkerStats};
use crate::task::{Task, TaskId, TaskStatus};
use crate::worker::{worker_loop, WorkerId};
use crate::QueueError;
use chrono::{TimeDelta, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::Duration,
};
use tokio::{
    sync::{watch, Notify},
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, error, info, warn};

pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Backoff before retry number `retry_count`: `min(60, 2^retry_count)` seconds.
pub fn retry_delay(retry_count: u32) -> Duration {
    2u64.checked_pow(retry_count)
        .map(Duration::from_secs)
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    tasks: HashMap<TaskId, Task>,
    pending: PriorityList,
    timers: HashMap<TaskId, AbortHandle>,
    stats: QueueStats,
    workers: Vec<WorkerStats>,
}

struct WorkerRuntime {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerRuntime {
    fn is_alive(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }
}

/// Outcome of one scrape as seen by the state machine.
pub(crate) type ScrapeOutcome = Result<serde_json::Value, String>;

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    observers: RwLock<Vec<Arc<dyn TaskObserver>>>,
    runtime: Mutex<Option<WorkerRuntime>>,
    pub(crate) scraper: SharedScraper,
    pub(crate) options: QueueOptions,
    pub(crate) wakeup: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TaskEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if !observers.is_empty() {
            notify(&observers, &event);
        }
    }

    /// Pop the most urgent pending task and mark it processing.
    pub(crate) fn next_task(&self) -> Option<Task> {
        let task = {
            let mut state = self.state();
            let id = state.pending.pop_front()?;
            let task = state.tasks.get_mut(&id)?;
            task.set_processing();
            task.clone()
        };
        info!(task_id = %task.id, url = %task.url, "processing task");
        self.emit(TaskEvent::Started(task.clone()));
        Some(task)
    }

    /// Apply the completion or failure transition for a processed task.
    pub(crate) fn finish(
        self: &Arc<Self>,
        worker_id: WorkerId,
        id: TaskId,
        outcome: ScrapeOutcome,
        elapsed: Duration,
    ) {
        let event = {
            let mut state = self.state();
            if let Some(stats) = state.workers.get_mut(worker_id.get()) {
                stats.record_execution_time(elapsed);
                match &outcome {
                    Ok(_) => stats.record_success(),
                    Err(_) => stats.record_failure(),
                }
            }

            let QueueState {
                tasks,
                timers,
                stats,
                ..
            } = &mut *state;
            let Some(task) = tasks.get_mut(&id) else {
                warn!(task_id = %id, "finished task is gone");
                return;
            };

            match outcome {
                Ok(result) => {
                    task.set_completed(result);
                    stats.completed_tasks += 1;
                    info!(task_id = %id, "task completed");
                    TaskEvent::Completed(task.clone())
                }
                Err(err) if task.can_retry() => {
                    task.set_retrying(&err);
                    stats.retry_tasks += 1;
                    let delay = retry_delay(task.retry_count);
                    info!(
                        task_id = %id,
                        retry = task.retry_count,
                        max_retries = task.max_retries,
                        delay_secs = delay.as_secs(),
                        "task failed, retry scheduled: {err}"
                    );
                    timers.insert(id, self.schedule_retry(id, delay));
                    TaskEvent::Retrying {
                        task: task.clone(),
                        delay,
                    }
                }
                Err(err) => {
                    task.set_failed(&err);
                    stats.failed_tasks += 1;
                    error!(
                        task_id = %id,
                        retries = task.retry_count,
                        "task failed permanently: {err}"
                    );
                    TaskEvent::Failed(task.clone())
                }
            }
        };
        self.emit(event);
    }

    fn schedule_retry(self: &Arc<Self>, id: TaskId, delay: Duration) -> AbortHandle {
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.requeue(id);
            }
        })
        .abort_handle()
    }

    /// Timer callback: move a retrying task back into the pending list.
    fn requeue(&self, id: TaskId) {
        {
            let mut state = self.state();
            state.timers.remove(&id);
            let priority = match state.tasks.get_mut(&id) {
                Some(task) if task.status == TaskStatus::Retrying => {
                    task.set_pending();
                    task.priority
                }
                _ => return,
            };
            state.pending.insert(id, priority);
        }
        debug!(task_id = %id, "task re-queued after backoff");
        self.wakeup.notify_one();
    }

    /// Put an interrupted task back without touching its retry budget.
    pub(crate) fn release(&self, id: TaskId) {
        let mut state = self.state();
        let priority = match state.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Processing => {
                task.set_pending();
                task.priority
            }
            _ => return,
        };
        state.pending.insert(id, priority);
        debug!(task_id = %id, "in-flight task released on shutdown");
    }

    fn stop_workers(&self) -> Option<WorkerRuntime> {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        let _ = runtime.shutdown.send(true);
        self.wakeup.notify_waiters();
        Some(runtime)
    }

    /// Abort backoff timers; their tasks become pending right away so a
    /// restarted queue picks them up.
    fn flush_timers(&self) {
        let mut state = self.state();
        let timers: Vec<(TaskId, AbortHandle)> = state.timers.drain().collect();
        for (id, timer) in timers {
            timer.abort();
            let priority = match state.tasks.get_mut(&id) {
                Some(task) if task.status == TaskStatus::Retrying => {
                    task.set_pending();
                    task.priority
                }
                _ => continue,
            };
            state.pending.insert(id, priority);
        }
    }
}

/// Priority queue of scraping tasks processed by background tokio workers.
///
/// Workers start lazily on the first [`TaskQueue::add_task`] (when
/// `auto_start` is set) or explicitly through [`TaskQueue::start`], and stop
/// on [`TaskQueue::shutdown`] or when the queue is dropped.
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    pub fn new(scraper: SharedScraper, options: QueueOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                observers: RwLock::new(Vec::new()),
                runtime: Mutex::new(None),
                scraper,
                options,
                wakeup: Notify::new(),
            }),
        }
    }

    pub fn options(&self) -> &QueueOptions {
        &self.shared.options
    }

    pub fn subscribe(&self, observer: impl TaskObserver + 'static) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(observer));
    }

    /// Enqueue a new pending task. Never blocks on the workers.
    pub fn add_task(
        &self,
        url: &str,
        affiliate_link: &str,
        platform: &str,
        priority: i32,
        max_retries: u32,
    ) -> Result<TaskId, QueueError> {
        if self.shared.options.auto_start {
            self.start()?;
        }

        let task = Task::new(url, affiliate_link, platform)
            .with_priority(priority)
            .with_max_retries(max_retries);
        let id = task.id;
        {
            let mut state = self.shared.state();
            state.pending.insert(id, priority);
            state.tasks.insert(id, task.clone());
            state.stats.total_tasks += 1;
        }

        info!(task_id = %id, url, platform, priority, "task added");
        self.shared.emit(TaskEvent::Added(task));
        self.shared.wakeup.notify_one();
        Ok(id)
    }

    /// [`TaskQueue::add_task`] with priority 0 and the configured retry limit.
    pub fn add_task_default(
        &self,
        url: &str,
        affiliate_link: &str,
        platform: &str,
    ) -> Result<TaskId, QueueError> {
        self.add_task(
            url,
            affiliate_link,
            platform,
            0,
            self.shared.options.max_retries,
        )
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.shared.state().tasks.get(id).cloned()
    }

    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .shared
            .state()
            .tasks
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    /// Ids of pending tasks in dequeue order.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.shared.state().pending.ids().copied().collect()
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let running = self.is_running();
        let state = self.shared.state();
        let count = |status: TaskStatus| {
            state
                .tasks
                .values()
                .filter(|task| task.status == status)
                .count()
        };

        QueueStatus {
            total_tasks: state.tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            processing_tasks: count(TaskStatus::Processing),
            retrying_tasks: count(TaskStatus::Retrying),
            completed_tasks: count(TaskStatus::Completed),
            failed_tasks: count(TaskStatus::Failed),
            running,
            stats: state.stats.clone(),
            workers: state.workers.clone(),
        }
    }

    /// Cancel a pending or retrying task. Tasks already being processed are
    /// left alone.
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        let cancelled = {
            let mut state = self.shared.state();
            let cancellable = state
                .tasks
                .get(id)
                .is_some_and(|task| task.status.is_cancellable());
            if !cancellable {
                return false;
            }

            state.pending.remove(id);
            if let Some(timer) = state.timers.remove(id) {
                timer.abort();
            }
            let Some(task) = state.tasks.get_mut(id) else {
                return false;
            };
            task.set_failed("Task cancelled");
            task.clone()
        };

        info!(task_id = %id, "task cancelled");
        self.shared.emit(TaskEvent::Cancelled(cancelled));
        true
    }

    /// Drop completed and failed tasks finished more than `older_than_hours`
    /// ago. Returns how many were removed.
    pub fn clear_completed_tasks(&self, older_than_hours: u64) -> usize {
        let Some(cutoff) = i64::try_from(older_than_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut state = self.shared.state();
        let before = state.tasks.len();
        state.tasks.retain(|_, task| {
            !(task.status.is_terminal()
                && task.completed_at.is_some_and(|done| done < cutoff))
        });
        let removed = before - state.tasks.len();
        info!(removed, older_than_hours, "cleared finished tasks");
        removed
    }

    /// True while at least one worker task is alive.
    pub fn is_running(&self) -> bool {
        self.shared
            .runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(WorkerRuntime::is_alive)
    }

    /// Spawn the workers on the current tokio runtime. No-op when they are
    /// already running.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut runtime = self
            .shared
            .runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if runtime.as_ref().is_some_and(WorkerRuntime::is_alive) {
            return Ok(());
        }
        if let Some(stale) = runtime.take() {
            warn!("all workers exited, restarting");
            let _ = stale.shutdown.send(true);
        }

        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let workers = self.shared.options.workers.max(1);
        {
            let mut state = self.shared.state();
            if state.workers.len() < workers {
                state.workers.resize(workers, WorkerStats::new());
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = (0..workers)
            .map(|id| {
                handle.spawn(worker_loop(
                    WorkerId::new(id),
                    self.shared.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        *runtime = Some(WorkerRuntime { shutdown, handles });
        info!(workers, "task queue started");
        Ok(())
    }

    /// Stop the workers and wait for them to exit. A task interrupted in
    /// flight goes back to pending.
    pub async fn shutdown(&self) {
        let Some(runtime) = self.shared.stop_workers() else {
            return;
        };
        self.shared.flush_timers();

        for handle in runtime.handles {
            if let Err(err) = handle.await {
                error!("worker exited abnormally: {err}");
            }
        }
        info!("task queue stopped");
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if self.shared.stop_workers().is_some() {
            debug!("task queue dropped while running");
        }
        self.shared.flush_timers();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("TaskQueue")
            .field("tasks", &state.tasks.len())
            .field("pending", &state.pending.len())
            .field("timers", &state.timers.len())
            .field("options", &self.shared.options)
            .finish()
    }
}

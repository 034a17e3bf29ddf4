#![deny(clippy::unwrap_used)]
use crate::queue::{ScrapeOutcome, Shared};
use std::{sync::Arc, time::Instant};
use tokio::{sync::watch, task::JoinError};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker life-cycle
/// 1) take the most urgent pending task (or idle until woken up)
/// 2) run the scraper over it, bounded by the task timeout
/// 3) hand the outcome to the queue state machine
///
/// A shutdown signal interrupts both the idle wait and an in-flight scrape.
/// The scrape runs in its own task, so a panicking scraper only fails that
/// attempt.
#[instrument(fields(worker_id = %worker_id), skip(shared, shutdown))]
pub(crate) async fn worker_loop(
    worker_id: WorkerId,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("worker started");
    let task_timeout = shared.options.task_timeout;

    'worker: loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(task) = shared.next_task() else {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break 'worker;
                    }
                }
                _ = shared.wakeup.notified() => {}
                _ = tokio::time::sleep(shared.options.idle_delay) => {}
            }
            continue;
        };

        let started = Instant::now();
        let scraper = shared.scraper.clone();
        let job = task.job();
        let mut scrape = tokio::spawn(async move { scraper.scrape(&job).await });
        let result = tokio::select! {
            _ = shutdown.changed() => {
                warn!(task_id = %task.id, "shutdown while processing, releasing task");
                scrape.abort();
                shared.release(task.id);
                break 'worker;
            }
            result = tokio::time::timeout(task_timeout, &mut scrape) => result,
        };

        let outcome: ScrapeOutcome = match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(join_err)) => Err(panic_message(join_err)),
            Err(_elapsed) => {
                scrape.abort();
                Err(format!(
                    "Scrape timed out after {}s",
                    task_timeout.as_secs_f64()
                ))
            }
        };
        shared.finish(worker_id, task.id, outcome, started.elapsed());
    }

    info!("worker stopped");
}

/// A panicking scraper is just another failed attempt.
fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("Scrape aborted: {err}");
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!("scraper panicked: {detail}");
    format!("Scraper panicked: {detail}")
}

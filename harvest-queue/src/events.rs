use crate::task::Task;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tracing::{error, warn};

/// Lifecycle notification. Each variant carries a snapshot of the task taken
/// right after the transition.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Added(Task),
    Started(Task),
    Completed(Task),
    Retrying { task: Task, delay: Duration },
    Failed(Task),
    Cancelled(Task),
}

impl TaskEvent {
    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::Added(task)
            | TaskEvent::Started(task)
            | TaskEvent::Completed(task)
            | TaskEvent::Failed(task)
            | TaskEvent::Cancelled(task) => task,
            TaskEvent::Retrying { task, .. } => task,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Added(_) => "task_added",
            TaskEvent::Started(_) => "task_started",
            TaskEvent::Completed(_) => "task_completed",
            TaskEvent::Retrying { .. } => "task_retrying",
            TaskEvent::Failed(_) => "task_failed",
            TaskEvent::Cancelled(_) => "task_cancelled",
        }
    }
}

pub trait TaskObserver: Send + Sync {
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()>;
}

impl<F> TaskObserver for F
where
    F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Deliver `event` to every observer. A failing or panicking observer is
/// logged and skipped.
pub(crate) fn notify(observers: &[Arc<dyn TaskObserver>], event: &TaskEvent) {
    for observer in observers {
        match panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(event = event.name(), task_id = %event.task().id, "observer error: {err:#}");
            }
            Err(_) => {
                error!(event = event.name(), task_id = %event.task().id, "observer panicked");
            }
        }
    }
}

//! # Scheduler
//!
//! Periodic and delayed tasks with cancellation handles.
//!
//! Guarantees of [`schedule`]:
//! - The first invocation runs immediately
//! - Invocations never overlap (a slow callback delays the next tick)
//! - Consecutive invocations start at least `period` apart
//! - Missed ticks are dropped, never queued

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Handle to a spawned task. Cancelling is immediate and idempotent.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Abort the task.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!(task = self.name, "[chat-sync] Cancelling task");
        }
        self.handle.abort();
    }

    /// Has the task completed or been cancelled?
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Task name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `task` every `period` until cancelled.
pub fn schedule<F, Fut>(name: &'static str, period: Duration, mut task: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            task().await;
        }
    });
    TaskHandle { name, handle }
}

/// Run `task` once after `delay`.
pub fn schedule_once<Fut>(name: &'static str, delay: Duration, task: Fut) -> TaskHandle
where
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        time::sleep(delay).await;
        task.await;
    });
    TaskHandle { name, handle }
}

/// Run `task` now in the background.
pub fn spawn_task<Fut>(name: &'static str, task: Fut) -> TaskHandle
where
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskHandle {
        name,
        handle: tokio::spawn(task),
    }
}

/// Tasks owned by one session. Once closed, new tasks are cancelled on arrival.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<TaskHandle>,
    closed: bool,
}

impl TaskSet {
    /// Create an open, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task.
    pub fn push(&mut self, task: TaskHandle) {
        if self.closed {
            task.cancel();
            return;
        }
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    /// Cancel every task and refuse new ones.
    pub fn cancel_all(&mut self) {
        self.closed = true;
        for task in self.tasks.drain(..) {
            task.cancel();
        }
    }

    /// Has `cancel_all` run?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

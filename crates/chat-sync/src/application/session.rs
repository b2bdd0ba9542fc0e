//! # Session Context
//!
//! One epoch of the engine: its id, wallet and the tasks it owns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::scheduler::{schedule, schedule_once, spawn_task, TaskSet};
use crate::domain::{Address, SessionId, SessionTag, WalletSession};

/// Handle to the current epoch. Cheap to clone into tasks.
#[derive(Clone)]
pub struct SessionContext {
    tag: SessionTag,
    tasks: Arc<Mutex<TaskSet>>,
}

impl SessionContext {
    /// Create a fresh epoch.
    pub fn new(id: SessionId, wallet: Option<WalletSession>) -> Self {
        Self {
            tag: SessionTag { id, wallet },
            tasks: Arc::new(Mutex::new(TaskSet::new())),
        }
    }

    /// Epoch id.
    pub fn id(&self) -> SessionId {
        self.tag.id
    }

    /// Wallet of this epoch.
    pub fn wallet(&self) -> Option<WalletSession> {
        self.tag.wallet
    }

    /// Connected account of this epoch.
    pub fn account(&self) -> Option<Address> {
        self.tag.wallet.map(|w| w.account_id)
    }

    /// Tag carried by this epoch's writes.
    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// Spawn a task owned by this epoch.
    pub fn spawn<Fut>(&self, name: &'static str, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(spawn_task(name, task));
    }

    /// Schedule a periodic task owned by this epoch.
    pub fn schedule<F, Fut>(&self, name: &'static str, period: Duration, task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(schedule(name, period, task));
    }

    /// Schedule a delayed task owned by this epoch.
    pub fn schedule_once<Fut>(&self, name: &'static str, delay: Duration, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(schedule_once(name, delay, task));
    }

    /// Cancel every task of this epoch. Idempotent.
    pub fn end(&self) {
        self.tasks.lock().cancel_all();
    }

    /// Has this epoch ended?
    pub fn is_ended(&self) -> bool {
        self.tasks.lock().is_closed()
    }

    /// Tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.tasks.lock().running()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.tag.id)
            .field("wallet", &self.tag.wallet)
            .field("ended", &self.is_ended())
            .finish()
    }
}

//! Task handles and schedulers for offloading a rule pass.
//!
//! A [`TaskHandle`] carries a process-wide unique generation id. Components remember the handle
//! of the task currently allowed to write them and tasks clear it only when the ids match, so a
//! stale task can never release a newer writer's token.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

#[derive(Debug)]
struct TaskShared {
    id: TaskId,
    status: Mutex<TaskStatus>,
    done: Condvar,
    cancelled: AtomicBool,
}

impl TaskShared {
    fn status(&self) -> MutexGuard<'_, TaskStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    /// Allocate a pending handle with a fresh generation id. Scheduler implementations call
    /// this from `submit`.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                status: Mutex::new(TaskStatus::Pending),
                done: Condvar::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn status(&self) -> TaskStatus {
        *self.shared.status()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_done()
    }

    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Block until the task reached a final status.
    pub fn wait(&self) {
        let mut status = self.shared.status();
        while !status.is_done() {
            status = self
                .shared
                .done
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            shared: self.shared.clone(),
        }
    }

    pub fn mark_running(&self) {
        *self.shared.status() = TaskStatus::Running;
    }

    /// Set a final status and wake waiters.
    pub fn finish(&self, status: TaskStatus) {
        debug_assert!(status.is_done());
        let mut guard = self.shared.status();
        *guard = status;
        self.shared.done.notify_all();
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TaskHandle {}

/// The running task's view of its own handle.
#[derive(Clone, Debug)]
pub struct CancelToken {
    shared: Arc<TaskShared>,
}

impl CancelToken {
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

pub type Work = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// Executor contract used by `AnimatorInstance`.
///
/// Work that is cancelled before it starts may be dropped without being called; anything it
/// owns must be released through `Drop`.
pub trait TaskScheduler: Send + Sync {
    /// Run `work` after every handle in `dependencies` finished.
    fn submit(&self, work: Work, dependencies: &[TaskHandle]) -> TaskHandle;

    fn wait(&self, handle: &TaskHandle) {
        handle.wait();
    }

    fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }

    fn is_finished(&self, handle: &TaskHandle) -> bool {
        handle.is_finished()
    }
}

/// Drive one unit of work to a final status on the current thread.
pub fn run_task(handle: &TaskHandle, work: Work) {
    if handle.is_cancelled() {
        drop(work);
        handle.finish(TaskStatus::Cancelled);
        return;
    }
    handle.mark_running();
    let token = handle.token();
    let outcome = catch_unwind(AssertUnwindSafe(move || work(&token)));
    let status = match outcome {
        Err(_) => {
            log::error!("task {} panicked", handle.id());
            TaskStatus::Failed
        }
        Ok(()) if handle.is_cancelled() => TaskStatus::Cancelled,
        Ok(()) => TaskStatus::Finished,
    };
    handle.finish(status);
}

/// Runs work synchronously inside `submit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl TaskScheduler for InlineScheduler {
    fn submit(&self, work: Work, dependencies: &[TaskHandle]) -> TaskHandle {
        for dependency in dependencies {
            dependency.wait();
        }
        let handle = TaskHandle::new();
        run_task(&handle, work);
        handle
    }
}

/// Runs every unit of work on its own OS thread after joining its dependencies.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    thread_name: String,
}

impl ThreadScheduler {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new("rigpose-task")
    }
}

impl TaskScheduler for ThreadScheduler {
    fn submit(&self, work: Work, dependencies: &[TaskHandle]) -> TaskHandle {
        let handle = TaskHandle::new();
        let task_handle = handle.clone();
        let dependencies = dependencies.to_vec();
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, handle.id()))
            .spawn(move || {
                for dependency in &dependencies {
                    dependency.wait();
                }
                run_task(&task_handle, work);
            });
        if let Err(err) = spawned {
            // The closure (and the work inside it) was dropped by the failed spawn.
            log::error!("failed to spawn task thread: {err}");
            handle.finish(TaskStatus::Failed);
        }
        handle
    }
}

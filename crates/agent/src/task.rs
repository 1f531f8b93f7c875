//! Tracking of asynchronous tasks.
//!
//! A task starts `Running` and moves exactly once to `Done`, `Failed` or `Cancelled`.
//! The task map is the only shared mutable state of the dispatch core; every transition
//! happens under its lock, so readers always see a whole task.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::{now_ms, EpochMs, TaskId, TaskState};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::task_store::TaskStore;

/// Cooperative cancellation hook stored alongside a task.
pub trait TaskCanceller: Send + Sync {
    fn cancel(&self) -> anyhow::Result<()>;
}

impl<F> TaskCanceller for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn cancel(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Snapshot of one task.
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub created_at_ms: EpochMs,
    pub finished_at_ms: Option<EpochMs>,
    canceller: Option<Arc<dyn TaskCanceller>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("value", &self.value)
            .field("error", &self.error)
            .field("finished_at_ms", &self.finished_at_ms)
            .finish_non_exhaustive()
    }
}

struct Inner {
    tasks: Mutex<HashMap<TaskId, Task>>,
    store: Option<TaskStore>,
}

/// Creates, tracks and retires asynchronous tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskService {
    inner: Arc<Inner>,
}

impl Default for TaskService {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskService {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A service that drops a task's persisted record once the task is terminal.
    pub fn with_store(store: TaskStore) -> Self {
        Self::build(Some(store))
    }

    fn build(store: Option<TaskStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                store,
            }),
        }
    }

    pub fn store(&self) -> Option<&TaskStore> {
        self.inner.store.as_ref()
    }

    pub fn new_task_id() -> TaskId {
        Uuid::new_v4().to_string()
    }

    /// Start `run` in the background under a fresh id. Must be called within a tokio runtime.
    pub fn create_task<F>(&self, run: F, canceller: Arc<dyn TaskCanceller>) -> Task
    where
        F: Future<Output = Result<Value, AgentError>> + Send + 'static,
    {
        self.create_task_with_id(Self::new_task_id(), run, canceller)
    }

    /// Like [`TaskService::create_task`] with a caller-chosen id, used when resuming.
    pub fn create_task_with_id<F>(
        &self,
        id: TaskId,
        run: F,
        canceller: Arc<dyn TaskCanceller>,
    ) -> Task
    where
        F: Future<Output = Result<Value, AgentError>> + Send + 'static,
    {
        let task = Task {
            id: id.clone(),
            state: TaskState::Running,
            value: None,
            error: None,
            created_at_ms: now_ms(),
            finished_at_ms: None,
            canceller: Some(canceller),
        };
        self.lock().insert(id.clone(), task.clone());
        info!(task_id = %id, "task started");

        let handle = tokio::spawn(run);
        let svc = self.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.to_string()),
                Err(join) if join.is_panic() => {
                    Err(format!("Task panicked: {}", panic_message(join.into_panic())))
                }
                Err(join) => Err(format!("Task aborted: {join}")),
            };
            svc.complete(&id, outcome).await;
        });

        task
    }

    pub fn find_task(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    /// Request cancellation of a running task.
    ///
    /// The task becomes `Cancelled` only if its canceller succeeds; otherwise it keeps
    /// running and the canceller's error is returned.
    pub fn cancel(&self, id: &str) -> Result<(), AgentError> {
        let canceller = {
            let tasks = self.lock();
            let task = tasks
                .get(id)
                .ok_or_else(|| AgentError::TaskNotFound(id.to_string()))?;
            if task.state.is_terminal() {
                return Err(AgentError::TaskNotRunning(id.to_string()));
            }
            task.canceller.clone()
        };

        // Called without the lock: a canceller may block or look tasks up itself.
        let canceller = canceller.ok_or(AgentError::NotSupported)?;
        canceller.cancel().map_err(AgentError::from_action)?;

        let cancelled = {
            let mut tasks = self.lock();
            match tasks.get_mut(id) {
                Some(task) if task.state == TaskState::Running => {
                    task.state = TaskState::Cancelled;
                    task.finished_at_ms = Some(now_ms());
                    task.canceller = None;
                    true
                }
                _ => false,
            }
        };
        if cancelled {
            info!(task_id = %id, "task cancelled");
            let svc = self.clone();
            let id = id.to_string();
            tokio::spawn(async move { svc.forget_record(&id).await });
        }
        Ok(())
    }

    /// Drop terminal tasks that finished more than `max_age` ago.
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let cutoff = now_ms() - max_age.as_millis() as i64;
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|_, t| match t.finished_at_ms {
            Some(finished) => finished > cutoff,
            None => true,
        });
        before - tasks.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn complete(&self, id: &str, outcome: Result<Value, String>) {
        let terminal = {
            let mut tasks = self.lock();
            let Some(task) = tasks.get_mut(id) else {
                return;
            };
            if task.state != TaskState::Running {
                debug!(task_id = %id, state = ?task.state, "discarding result of finished task");
                return;
            }
            match outcome {
                Ok(value) => {
                    task.state = TaskState::Done;
                    task.value = Some(value);
                }
                Err(error) => {
                    warn!(task_id = %id, %error, "task failed");
                    task.state = TaskState::Failed;
                    task.error = Some(error);
                }
            }
            task.finished_at_ms = Some(now_ms());
            task.canceller = None;
            task.state
        };
        info!(task_id = %id, state = ?terminal, "task finished");
        self.forget_record(id).await;
    }

    async fn forget_record(&self, id: &str) {
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.remove(id).await {
                warn!(task_id = %id, error = %format!("{e:#}"), "failed to remove task record");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

use agent_core::{TaskState, TaskStateEnvelope};
use async_trait::async_trait;
use serde_json::Value;

use crate::action::TypedAction;
use crate::error::AgentError;
use crate::task::TaskService;

/// Report a task: its state while running, then its value or error.
pub struct GetTaskAction {
    tasks: TaskService,
}

impl GetTaskAction {
    pub fn new(tasks: TaskService) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TypedAction for GetTaskAction {
    const NAME: &'static str = "get_task";
    const ASYNCHRONOUS: bool = false;

    type Args = (String,);
    type Output = Value;

    async fn execute(&self, args: (String,)) -> anyhow::Result<Value> {
        let (id,) = args;
        let task = self
            .tasks
            .find_task(&id)
            .ok_or_else(|| AgentError::TaskNotFound(id.clone()))?;

        match task.state {
            TaskState::Running => Ok(serde_json::to_value(TaskStateEnvelope {
                agent_task_id: task.id,
                state: TaskState::Running,
            })?),
            TaskState::Done => Ok(task.value.unwrap_or(Value::Null)),
            TaskState::Failed => Err(AgentError::Action(task.error.unwrap_or_default()).into()),
            TaskState::Cancelled => anyhow::bail!("Task with id {id} was canceled"),
        }
    }
}

pub struct CancelTaskAction {
    tasks: TaskService,
}

impl CancelTaskAction {
    pub fn new(tasks: TaskService) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TypedAction for CancelTaskAction {
    const NAME: &'static str = "cancel_task";
    const ASYNCHRONOUS: bool = false;

    type Args = (String,);
    type Output = &'static str;

    async fn execute(&self, args: (String,)) -> anyhow::Result<&'static str> {
        let (id,) = args;
        self.tasks.cancel(&id)?;
        Ok("canceled")
    }
}

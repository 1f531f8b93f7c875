//! Directive handling from method name to reply envelope.
//!
//! Synchronous actions run inline and their value is the reply. Asynchronous actions are
//! handed to the [`TaskService`] and the reply is the task handle; the orchestrator polls
//! `get_task` for the outcome.

use std::sync::Arc;

use agent_core::{ActionPayload, Directive, Reply, TaskId, TaskStateEnvelope};
use anyhow::Context;
use serde_json::Value;
use tracing::{info, warn};

use crate::action::Action;
use crate::error::AgentError;
use crate::registry::ActionFactory;
use crate::runner::{parse_payload, ActionRunner};
use crate::task::{TaskCanceller, TaskService};
use crate::task_store::TaskRecord;

/// Forwards task cancellation to the action that owns the task.
struct ActionCanceller(Arc<dyn Action>);

impl TaskCanceller for ActionCanceller {
    fn cancel(&self) -> anyhow::Result<()> {
        self.0.cancel()
    }
}

pub struct ActionDispatcher {
    factory: ActionFactory,
    runner: ActionRunner,
}

impl ActionDispatcher {
    pub fn new(factory: ActionFactory) -> Self {
        Self {
            factory,
            runner: ActionRunner::new(),
        }
    }

    pub fn tasks(&self) -> &TaskService {
        self.factory.tasks()
    }

    /// Handle a raw message-bus body `{"method", "arguments", "reply_to"?}`.
    pub async fn dispatch_bytes(&self, body: &[u8]) -> Reply {
        match serde_json::from_slice::<Directive>(body) {
            Ok(directive) => self.dispatch(&directive.method, body).await,
            Err(e) => {
                warn!(error = %e, "rejecting malformed directive");
                Reply::exception(AgentError::PayloadUnmarshal(e.to_string()))
            }
        }
    }

    pub async fn dispatch_directive(&self, directive: &Directive) -> Reply {
        let payload = ActionPayload {
            arguments: directive.arguments.clone(),
        };
        match serde_json::to_vec(&payload) {
            Ok(bytes) => self.dispatch(&directive.method, &bytes).await,
            Err(e) => Reply::exception(AgentError::PayloadUnmarshal(e.to_string())),
        }
    }

    /// Run `method` against `payload` (`{"arguments": [...]}`) and build the reply.
    pub async fn dispatch(&self, method: &str, payload: &[u8]) -> Reply {
        info!(method, "directive received");
        match self.try_dispatch(method, payload).await {
            Ok(value) => Reply::Value(value),
            Err(err) => {
                warn!(method, error = %err, "directive failed");
                Reply::exception(err)
            }
        }
    }

    async fn try_dispatch(&self, method: &str, payload: &[u8]) -> Result<Value, AgentError> {
        let action = self.factory.create(method)?;
        if !action.is_asynchronous() {
            return self.runner.run(action.as_ref(), payload).await;
        }

        let parsed = parse_payload(payload)?;
        action.check_args(&parsed.arguments)?;

        let id = TaskService::new_task_id();
        if action.is_persistent() {
            self.record(&id, method, parsed.arguments)
                .await
                .map_err(AgentError::from_action)?;
        }

        let runner = self.runner;
        let payload = payload.to_vec();
        let run_action = Arc::clone(&action);
        let task = self.tasks().create_task_with_id(
            id,
            async move { runner.run(run_action.as_ref(), &payload).await },
            Arc::new(ActionCanceller(action)),
        );

        serde_json::to_value(TaskStateEnvelope {
            agent_task_id: task.id,
            state: task.state,
        })
        .map_err(|e| AgentError::InvalidActionContract(e.to_string()))
    }

    async fn record(&self, id: &TaskId, method: &str, arguments: Vec<Value>) -> anyhow::Result<()> {
        let Some(store) = self.tasks().store() else {
            return Ok(());
        };
        store
            .add(TaskRecord {
                task_id: id.clone(),
                method: method.to_string(),
                arguments,
            })
            .await
            .context("Saving task record")
    }

    /// Restart the persistent tasks left over from a previous run under their old ids.
    ///
    /// Must be called within a tokio runtime. Returns the number of tasks restored.
    pub async fn resume_persisted(&self) -> anyhow::Result<usize> {
        let Some(store) = self.tasks().store() else {
            return Ok(0);
        };
        let records = store.load().await.context("Loading task records")?;
        let count = records.len();

        for record in records {
            info!(task_id = %record.task_id, method = %record.method, "resuming task");
            let action = match self.factory.create(&record.method) {
                Ok(action) => action,
                Err(err) => {
                    warn!(task_id = %record.task_id, error = %err, "cannot resume task");
                    let canceller: Arc<dyn TaskCanceller> =
                        Arc::new(|| -> anyhow::Result<()> { Err(AgentError::NotSupported.into()) });
                    self.tasks().create_task_with_id(
                        record.task_id,
                        async move { Err::<Value, _>(err) },
                        canceller,
                    );
                    continue;
                }
            };

            let payload = serde_json::to_vec(&ActionPayload {
                arguments: record.arguments,
            })?;
            let runner = self.runner;
            let run_action = Arc::clone(&action);
            self.tasks().create_task_with_id(
                record.task_id,
                async move { runner.resume(run_action.as_ref(), &payload).await },
                Arc::new(ActionCanceller(action)),
            );
        }
        Ok(count)
    }
}

use agent_core::BindError;
use thiserror::Error;

/// Errors surfaced to the orchestrator as `{"exception": {"message": ...}}`.
///
/// The orchestrator only sees the rendered message, so several of these strings are part
/// of the wire contract.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unmarshalling action payload: {0}")]
    PayloadUnmarshal(String),

    #[error("Binding action arguments: {0}")]
    ArgumentBinding(#[from] BindError),

    #[error("Invalid action contract: {0}")]
    InvalidActionContract(String),

    #[error("unknown message {0}")]
    UnknownAction(String),

    #[error("Task with id {0} could not be found")]
    TaskNotFound(String),

    #[error("Task with id {0} is not running")]
    TaskNotRunning(String),

    #[error("not supported")]
    NotSupported,

    #[error("{0}")]
    Action(String),
}

impl AgentError {
    /// Convert an action's internal error, keeping typed agent errors intact.
    ///
    /// Anything else is flattened to its full context chain (`outer: inner: root`).
    pub fn from_action(err: anyhow::Error) -> Self {
        match err.downcast::<AgentError>() {
            Ok(agent) => agent,
            Err(other) => AgentError::Action(format!("{other:#}")),
        }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, AgentError::NotSupported)
    }
}

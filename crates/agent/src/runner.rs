use agent_core::ActionPayload;
use serde_json::Value;
use tracing::debug;

use crate::action::Action;
use crate::error::AgentError;

/// Runs one directive payload against a resolved action.
///
/// The payload is the raw message body; only its `arguments` array is read, so transport
/// envelopes carrying extra fields (`method`, `reply_to`) can be passed through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionRunner;

impl ActionRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, action: &dyn Action, payload: &[u8]) -> Result<Value, AgentError> {
        let payload = parse_payload(payload)?;
        debug!(action = action.name(), args = payload.arguments.len(), "running action");
        action.run(&payload.arguments).await
    }

    pub async fn resume(&self, action: &dyn Action, payload: &[u8]) -> Result<Value, AgentError> {
        let payload = parse_payload(payload)?;
        debug!(action = action.name(), "resuming action");
        action.resume(&payload.arguments).await
    }
}

pub fn parse_payload(payload: &[u8]) -> Result<ActionPayload, AgentError> {
    serde_json::from_slice(payload).map_err(|e| AgentError::PayloadUnmarshal(e.to_string()))
}

//! The action seam between untyped directives and typed business logic.
//!
//! Every directive resolves to an [`Action`], an object-safe trait that takes the raw JSON
//! argument list. Concrete actions implement [`TypedAction`] with their own parameter and
//! output types; [`Typed`] adapts one to the other by binding arguments, running the
//! action and serializing its output.

use agent_core::ActionArgs;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::AgentError;

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    /// Asynchronous actions run as tracked tasks; the caller gets a task handle back.
    fn is_asynchronous(&self) -> bool;

    /// Persistent actions are recorded so they can be resumed after an agent restart.
    fn is_persistent(&self) -> bool;

    /// Bind `args` without running, so binding errors surface before a task is created.
    fn check_args(&self, _args: &[Value]) -> Result<(), AgentError> {
        Ok(())
    }

    async fn run(&self, args: &[Value]) -> Result<Value, AgentError>;

    async fn resume(&self, _args: &[Value]) -> Result<Value, AgentError> {
        Err(AgentError::NotSupported)
    }

    fn cancel(&self) -> anyhow::Result<()> {
        Err(AgentError::NotSupported.into())
    }
}

/// An action with a statically typed parameter list and output.
#[async_trait]
pub trait TypedAction: Send + Sync + 'static {
    const NAME: &'static str;
    const ASYNCHRONOUS: bool;
    const PERSISTENT: bool = false;

    type Args: ActionArgs + Send + 'static;
    type Output: Serialize + Send;

    async fn execute(&self, args: Self::Args) -> anyhow::Result<Self::Output>;

    async fn resume(&self, _args: Self::Args) -> anyhow::Result<Self::Output> {
        Err(AgentError::NotSupported.into())
    }

    fn cancel(&self) -> anyhow::Result<()> {
        Err(AgentError::NotSupported.into())
    }
}

/// Adapter exposing a [`TypedAction`] as an [`Action`].
pub struct Typed<A>(pub A);

impl<A: TypedAction> Typed<A> {
    fn finish(output: anyhow::Result<A::Output>) -> Result<Value, AgentError> {
        let output = output.map_err(AgentError::from_action)?;
        serde_json::to_value(output).map_err(|e| {
            AgentError::InvalidActionContract(format!("{} produced an unserializable value: {e}", A::NAME))
        })
    }
}

#[async_trait]
impl<A: TypedAction> Action for Typed<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn is_asynchronous(&self) -> bool {
        A::ASYNCHRONOUS
    }

    fn is_persistent(&self) -> bool {
        A::PERSISTENT
    }

    fn check_args(&self, args: &[Value]) -> Result<(), AgentError> {
        A::Args::bind(args)?;
        Ok(())
    }

    async fn run(&self, args: &[Value]) -> Result<Value, AgentError> {
        let bound = A::Args::bind(args)?;
        Self::finish(self.0.execute(bound).await)
    }

    async fn resume(&self, args: &[Value]) -> Result<Value, AgentError> {
        let bound = A::Args::bind(args)?;
        Self::finish(self.0.resume(bound).await)
    }

    fn cancel(&self) -> anyhow::Result<()> {
        self.0.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TypedAction for Echo {
        const NAME: &'static str = "echo";
        const ASYNCHRONOUS: bool = false;

        type Args = (String, u32);
        type Output = String;

        async fn execute(&self, args: Self::Args) -> anyhow::Result<String> {
            let (s, n) = args;
            Ok(s.repeat(n as usize))
        }
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("no wire form"))
        }
    }

    struct Broken;

    #[async_trait]
    impl TypedAction for Broken {
        const NAME: &'static str = "broken";
        const ASYNCHRONOUS: bool = false;

        type Args = ();
        type Output = Unserializable;

        async fn execute(&self, _: ()) -> anyhow::Result<Unserializable> {
            Ok(Unserializable)
        }
    }

    #[tokio::test]
    async fn typed_binds_and_serializes() {
        let action = Typed(Echo);
        assert_eq!(action.run(&[json!("ab"), json!(2)]).await.unwrap(), json!("abab"));
        assert!(matches!(
            action.run(&[json!("ab")]).await,
            Err(AgentError::ArgumentBinding(_))
        ));
    }

    #[tokio::test]
    async fn unserializable_output_is_a_contract_error() {
        let err = Typed(Broken).run(&[]).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidActionContract(_)));
    }

    #[tokio::test]
    async fn resume_and_cancel_default_to_not_supported() {
        let action = Typed(Echo);
        assert!(action
            .resume(&[json!("a"), json!(1)])
            .await
            .unwrap_err()
            .is_not_supported());
        assert_eq!(action.cancel().unwrap_err().to_string(), "not supported");
    }
}

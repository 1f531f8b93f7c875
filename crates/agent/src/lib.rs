#![forbid(unsafe_code)]

//! Host agent runtime: resolves orchestrator directives to actions, runs them inline or
//! as tracked tasks, and talks to the host through the collaborators in [`platform`].

pub mod action;
pub mod actions;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod platform;
pub mod registry;
pub mod runner;
pub mod task;
pub mod task_store;

pub use action::{Action, Typed, TypedAction};
pub use dispatcher::ActionDispatcher;
pub use error::AgentError;
pub use registry::{ActionFactory, ActionKind, AgentDeps};
pub use task::TaskService;

#![forbid(unsafe_code)]

//! Shared wire models and pure logic for the host agent.
//!
//! Nothing in this crate performs I/O: argument binding, drain classification and the
//! JSON shapes exchanged with the orchestrator all live here so they can be tested
//! without a runtime.

pub mod binder;
pub mod drain;
pub mod model;
pub mod time;

pub use binder::{bind_at, bind_rest, check_arity, ActionArgs, BindError, Variadic};
pub use drain::{DrainError, DrainParams, DrainResult, DrainType, HashChange, JobChange};
pub use model::*;
pub use time::*;

//! # Conductor Agent - Workflow Engine and Checkpoint Store
//!
//! The top layer of the orchestration core. [`WorkflowEngine`] drives a
//! task through planning, routed step execution and completion, with the
//! planner and responder behind the [`Planner`] and [`Responder`] seams
//! and every state transition checkpointed through a [`StateStore`].
//!
//! ```ignore
//! let engine = WorkflowEngine::new(planner, responder, router, store);
//! let state = engine.run("forecast for kyiv, then summarize").await?;
//! println!("{}", state.final_answer.unwrap());
//! ```

pub mod collaborators;
pub mod engine;
pub mod store;

pub use collaborators::{EchoResponder, Planner, Responder, StaticPlanner};
pub use engine::{EngineConfig, FailurePolicy, WorkflowEngine};
pub use store::{FileStateStore, InMemoryStateStore, StateStore};

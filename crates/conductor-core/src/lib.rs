//! # Conductor Core - Shared Data Model
//!
//! Shared types for the Conductor orchestration core: the error taxonomy,
//! execution plans produced by the planner collaborator, and the workflow
//! run state that forms the checkpoint contract.
//!
//! Higher layers build on these types: `conductor-mcp` for the server
//! registry, connection manager and router, and `conductor-agent` for the
//! workflow engine and state store.

pub mod error;
pub mod plan;
pub mod state;

pub use error::{
    ConfigError, ConfigResult, ConnectError, ConnectResult, InvokeError, InvokeResult,
    PlanningError, PlanningResult, RouteError, RouteResult, StoreError, StoreResult,
    WorkflowError, WorkflowResult,
};
pub use plan::{ExecutionPlan, PlanStep};
pub use state::{AgentState, ErrorRecord, StepResult, WorkflowStatus};

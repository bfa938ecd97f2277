//! Workflow run state and the checkpoint contract.
//!
//! [`AgentState`] is the single mutable aggregate threaded through a
//! workflow run. Exactly one instance exists per task run; it is owned by
//! the engine for the run's duration and handed to the state store only as
//! a snapshot. Field names are stable across versions so a persisted
//! checkpoint reloads byte-for-byte equivalent in observable fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::ExecutionPlan;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Run created but not yet started.
    Pending,
    /// Planner collaborator is producing a plan.
    Planning,
    /// Plan steps are being executed.
    Executing,
    /// All steps processed and a final answer produced.
    Completed,
    /// Run terminated with an error.
    Failed,
}

impl WorkflowStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Planning => write!(f, "planning"),
            WorkflowStatus::Executing => write!(f, "executing"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one executed plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based index of the plan step this result belongs to.
    pub step_index: usize,
    /// Server that served the step, if one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// Tool that was invoked, if one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Whether the step succeeded.
    pub success: bool,
    /// Payload returned by the tool or responder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error message when the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Create a successful result.
    pub fn success(step_index: usize, payload: serde_json::Value) -> Self {
        Self {
            step_index,
            server_id: None,
            tool_name: None,
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create a failed result.
    pub fn failure(step_index: usize, error: impl Into<String>) -> Self {
        Self {
            step_index,
            server_id: None,
            tool_name: None,
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Attach the server and tool that served the step.
    pub fn with_route(mut self, server_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Check whether the payload signals that the success criteria are
    /// already met, allowing the run to terminate early.
    pub fn signals_early_termination(&self) -> bool {
        self.payload
            .as_ref()
            .and_then(|p| p.get("success_criteria_met"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// One entry of the run's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the error occurred.
    pub at: DateTime<Utc>,
    /// Step the error belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Error message.
    pub message: String,
}

/// The mutable aggregate for one workflow run.
///
/// Invariants maintained by the mutation helpers:
/// - `current_step_index` is the number of completed steps and never
///   exceeds `plan.steps.len()`
/// - `step_results.len()` never exceeds `current_step_index`
/// - `iteration_count` increments exactly once per completed step or
///   retry attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Unique identifier for this run; the checkpoint key.
    pub run_id: String,
    /// The task being processed.
    pub task: String,
    /// The plan, once planning has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    /// Number of steps completed so far.
    pub current_step_index: usize,
    /// Results appended in strict step order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_results: Vec<StepResult>,
    /// Tools used across the run, in invocation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    /// Completed steps plus retry attempts.
    pub iteration_count: u32,
    /// Accumulated errors, recoverable and terminal alike.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_log: Vec<ErrorRecord>,
    /// Final answer, present once the run completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    /// Current run status.
    pub status: WorkflowStatus,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    /// Create fresh state for a task.
    pub fn new(task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            task: task.into(),
            plan: None,
            current_step_index: 0,
            step_results: Vec::new(),
            tools_used: Vec::new(),
            iteration_count: 0,
            error_log: Vec::new(),
            final_answer: None,
            status: WorkflowStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the run status.
    pub fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Install the parsed plan and move to the executing phase.
    pub fn set_plan(&mut self, plan: ExecutionPlan) {
        self.plan = Some(plan);
        self.updated_at = Utc::now();
    }

    /// Number of steps in the plan, zero before planning.
    pub fn plan_len(&self) -> usize {
        self.plan.as_ref().map_or(0, ExecutionPlan::len)
    }

    /// 1-based index of the next step to execute, `None` when the plan
    /// is exhausted.
    pub fn next_step_index(&self) -> Option<usize> {
        let next = self.current_step_index + 1;
        (next <= self.plan_len()).then_some(next)
    }

    /// Count one completed step or retry attempt, returning the new total.
    pub fn note_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.updated_at = Utc::now();
        self.iteration_count
    }

    /// Record a completed step, advancing the step cursor.
    pub fn complete_step(&mut self, result: StepResult) {
        debug_assert_eq!(result.step_index, self.current_step_index + 1);
        debug_assert!(result.step_index <= self.plan_len());
        if let Some(tool) = &result.tool_name {
            self.tools_used.push(tool.clone());
        }
        self.current_step_index = result.step_index;
        self.step_results.push(result);
        self.updated_at = Utc::now();
    }

    /// Append an entry to the error log.
    pub fn record_error(&mut self, step_index: Option<usize>, message: impl Into<String>) {
        self.error_log.push(ErrorRecord {
            at: Utc::now(),
            step_index,
            message: message.into(),
        });
        self.updated_at = Utc::now();
    }

    /// Set the final answer.
    pub fn set_final_answer(&mut self, answer: impl Into<String>) {
        self.final_answer = Some(answer.into());
        self.updated_at = Utc::now();
    }
}

//! Collaborator seams for the workflow engine.
//!
//! The engine never talks to a language model directly. Planning and
//! response generation sit behind these traits so production deployments
//! can plug in a model client while tests script the collaborators.

use async_trait::async_trait;
use serde_json::Value;

use conductor_core::{PlanningError, PlanningResult, StepResult, WorkflowError};

/// Produces a structured plan for a task.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan a task. `context` carries the results of any previously
    /// completed steps when re-planning a resumed run.
    ///
    /// The returned JSON must parse as an execution plan; anything else
    /// fails the run.
    async fn plan(&self, task: &str, context: &Value) -> PlanningResult<Value>;
}

/// Produces direct answers and final summaries.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Answer a direct-response step without touching tool servers.
    async fn respond(&self, task: &str, step_description: &str) -> Result<String, WorkflowError>;

    /// Summarize a completed run into the final answer.
    async fn summarize(
        &self,
        task: &str,
        results: &[StepResult],
    ) -> Result<String, WorkflowError>;
}

/// Planner returning a fixed JSON value, for tests and dry runs.
pub struct StaticPlanner {
    plan: Value,
}

impl StaticPlanner {
    /// Create a planner that always returns the given value.
    pub fn new(plan: Value) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _task: &str, _context: &Value) -> PlanningResult<Value> {
        if self.plan.is_null() {
            return Err(PlanningError::NotAnObject);
        }
        Ok(self.plan.clone())
    }
}

/// Responder that echoes the step description, for tests and dry runs.
#[derive(Default)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, _task: &str, step_description: &str) -> Result<String, WorkflowError> {
        Ok(step_description.to_string())
    }

    async fn summarize(
        &self,
        task: &str,
        results: &[StepResult],
    ) -> Result<String, WorkflowError> {
        let succeeded = results.iter().filter(|r| r.success).count();
        Ok(format!(
            "Task {task:?}: {succeeded} of {} steps succeeded",
            results.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_planner_returns_plan() {
        let planner = StaticPlanner::new(json!({"steps": []}));
        let value = planner.plan("task", &Value::Null).await.unwrap();
        assert_eq!(value, json!({"steps": []}));
    }

    #[tokio::test]
    async fn test_echo_responder() {
        let responder = EchoResponder;
        let answer = responder.respond("task", "say hello").await.unwrap();
        assert_eq!(answer, "say hello");

        let summary = responder
            .summarize("task", &[StepResult::success(1, json!({}))])
            .await
            .unwrap();
        assert!(summary.contains("1 of 1"));
    }
}

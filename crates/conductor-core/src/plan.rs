//! Execution plans produced by the planner collaborator.
//!
//! The planner is an opaque collaborator that returns structured JSON. This
//! module parses that JSON into a validated [`ExecutionPlan`]; a plan is
//! immutable once parsed, and re-planning always produces a new plan.

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, PlanningResult};

/// Step actions that short-circuit to the direct-response path,
/// bypassing routing and tool servers entirely.
const DIRECT_RESPONSE_ACTIONS: &[&str] = &["respond", "answer", "complete"];

/// One unit of work within an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based index matching the step's position in the plan.
    #[serde(rename = "step")]
    pub index: usize,
    /// The action the step performs.
    pub action: String,
    /// Human-readable description; also the routing hint for this step.
    pub description: String,
    /// Tool capabilities the step needs; the first entry is the
    /// requested tool when routing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_needed: Vec<String>,
}

impl PlanStep {
    /// Check whether this step should be answered directly by the
    /// responder collaborator instead of a tool server.
    pub fn is_direct_response(&self) -> bool {
        let action = self.action.to_lowercase();
        DIRECT_RESPONSE_ACTIONS.contains(&action.as_str())
    }

    /// The requested tool for routing, if the step names any.
    pub fn requested_tool(&self) -> Option<&str> {
        self.tools_needed.first().map(String::as_str)
    }
}

/// A structured multi-step plan for a task.
///
/// Created once per task by the planner; immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Ordered steps, indices contiguous from 1.
    pub steps: Vec<PlanStep>,
    /// What the planner expects the run to produce.
    #[serde(default)]
    pub expected_outcome: String,
    /// Conditions under which the task counts as done.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_criteria: Vec<String>,
    /// Risks the planner identified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
}

impl ExecutionPlan {
    /// Parse and validate a planner response.
    ///
    /// The response must be a JSON object with a non-empty `steps` array;
    /// every step must carry `action` and `description` strings and a
    /// contiguous 1-based `step` index. Anything else is a
    /// [`PlanningError`] — malformed plans are never partially trusted.
    pub fn from_value(value: &serde_json::Value) -> PlanningResult<Self> {
        let obj = value.as_object().ok_or(PlanningError::NotAnObject)?;

        let raw_steps = obj
            .get("steps")
            .and_then(|s| s.as_array())
            .ok_or(PlanningError::EmptyPlan)?;
        if raw_steps.is_empty() {
            return Err(PlanningError::EmptyPlan);
        }

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (position, raw) in raw_steps.iter().enumerate() {
            let step = raw
                .as_object()
                .ok_or(PlanningError::MissingField { position, field: "step" })?;

            let index = step
                .get("step")
                .and_then(|v| v.as_u64())
                .ok_or(PlanningError::MissingField { position, field: "step" })?;
            let expected = position as u64 + 1;
            if index != expected {
                return Err(PlanningError::BadStepIndex {
                    position,
                    found: index,
                    expected,
                });
            }

            let action = step
                .get("action")
                .and_then(|v| v.as_str())
                .ok_or(PlanningError::MissingField {
                    position,
                    field: "action",
                })?;
            let description =
                step.get("description")
                    .and_then(|v| v.as_str())
                    .ok_or(PlanningError::MissingField {
                        position,
                        field: "description",
                    })?;

            let tools_needed = step
                .get("tools_needed")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            steps.push(PlanStep {
                index: index as usize,
                action: action.to_string(),
                description: description.to_string(),
                tools_needed,
            });
        }

        let string_list = |key: &str| -> Vec<String> {
            obj.get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|s| s.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            steps,
            expected_outcome: obj
                .get("expected_outcome")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            success_criteria: string_list("success_criteria"),
            risks: string_list("risks"),
        })
    }

    /// Number of steps in the plan.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan has no steps (never true for a parsed plan).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

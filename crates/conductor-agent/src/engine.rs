//! Workflow engine.
//!
//! Drives one run through the planning, execution and completion phases.
//! The engine owns the run's [`AgentState`], checkpointing it after
//! planning and after every completed step; a cancelled or crashed run
//! resumes from the last checkpoint without re-executing finished steps.
//!
//! Step failures are recorded, not thrown: under the default continue
//! policy a failed step leaves its error in the log and execution moves
//! on, so partial tool availability still yields a useful answer. The
//! iteration ceiling counts attempts (completions plus retries) and
//! fails the run closed when breached.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conductor_core::{
    AgentState, ExecutionPlan, PlanStep, StepResult, WorkflowError, WorkflowResult, WorkflowStatus,
};
use conductor_mcp::Router;

use crate::collaborators::{Planner, Responder};
use crate::store::StateStore;

/// What to do when a step exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the run on the first irrecoverable step.
    Abort,
    /// Record the failure and move to the next step.
    #[default]
    Continue,
}

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on iterations (completed steps plus retry attempts).
    pub max_iterations: u32,
    /// Retries per step after the first attempt, for retryable errors.
    pub max_step_retries: u32,
    /// Delay between retry attempts.
    pub retry_backoff: Duration,
    /// Behavior when a step fails irrecoverably.
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_step_retries: 2,
            retry_backoff: Duration::from_millis(100),
            failure_policy: FailurePolicy::Continue,
        }
    }
}

/// Executes workflow runs against routed tool servers.
pub struct WorkflowEngine {
    planner: Arc<dyn Planner>,
    responder: Arc<dyn Responder>,
    router: Arc<Router>,
    store: Arc<dyn StateStore>,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    /// Create an engine with the default configuration.
    pub fn new(
        planner: Arc<dyn Planner>,
        responder: Arc<dyn Responder>,
        router: Arc<Router>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self::with_config(planner, responder, router, store, EngineConfig::default())
    }

    /// Create an engine with explicit tunables.
    pub fn with_config(
        planner: Arc<dyn Planner>,
        responder: Arc<dyn Responder>,
        router: Arc<Router>,
        store: Arc<dyn StateStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            planner,
            responder,
            router,
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels in-flight runs when triggered.
    ///
    /// Cancellation is observed between steps: the current step finishes
    /// or fails, its result is checkpointed, and the run ends with
    /// [`WorkflowError::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a task from scratch.
    ///
    /// The returned state is terminal either way; on error it is also
    /// checkpointed, so the caller can inspect or resume it later.
    pub async fn run(&self, task: &str) -> WorkflowResult<AgentState> {
        let state = AgentState::new(task);
        info!(run_id = %state.run_id, task = %task, "Starting workflow run");
        self.drive(state).await
    }

    /// Resume a checkpointed run.
    ///
    /// Completed steps are never re-executed; execution picks up at the
    /// step cursor. A run checkpointed before planning finished is
    /// re-planned with its accumulated results as context.
    pub async fn resume(&self, run_id: &str) -> WorkflowResult<AgentState> {
        let state = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| WorkflowError::Store(conductor_core::StoreError::Io(format!(
                "no checkpoint for run {run_id}"
            ))))?;
        info!(
            run_id = %state.run_id,
            completed_steps = state.current_step_index,
            "Resuming workflow run"
        );
        self.drive(state).await
    }

    async fn drive(&self, mut state: AgentState) -> WorkflowResult<AgentState> {
        match self.drive_inner(&mut state).await {
            Ok(()) => Ok(state),
            Err(err) => {
                state.record_error(None, err.to_string());
                state.set_status(WorkflowStatus::Failed);
                // Preserve progress even for failed runs.
                self.store.save(&state).await?;
                Err(err)
            }
        }
    }

    async fn drive_inner(&self, state: &mut AgentState) -> WorkflowResult<()> {
        if state.plan.is_none() {
            self.plan_phase(state).await?;
        }

        state.set_status(WorkflowStatus::Executing);
        while let Some(step_index) = state.next_step_index() {
            if self.cancel.is_cancelled() {
                warn!(run_id = %state.run_id, "Run cancelled");
                return Err(WorkflowError::Cancelled);
            }

            let step = state
                .plan
                .as_ref()
                .and_then(|plan| plan.steps.get(step_index - 1))
                .cloned()
                .expect("cursor within plan bounds");

            let result = self.execute_step(state, &step).await?;
            let early = result.success && result.signals_early_termination();
            state.complete_step(result);
            self.store.save(state).await?;

            if early {
                info!(run_id = %state.run_id, step = step_index, "Success criteria met early");
                break;
            }
        }

        let summary = self
            .responder
            .summarize(&state.task, &state.step_results)
            .await?;
        state.set_final_answer(summary);
        state.set_status(WorkflowStatus::Completed);
        self.store.save(state).await?;
        info!(run_id = %state.run_id, iterations = state.iteration_count, "Run completed");
        Ok(())
    }

    async fn plan_phase(&self, state: &mut AgentState) -> WorkflowResult<()> {
        state.set_status(WorkflowStatus::Planning);
        self.store.save(state).await?;

        let context = planning_context(state);
        let raw = self.planner.plan(&state.task, &context).await?;
        let plan = ExecutionPlan::from_value(&raw)?;
        info!(run_id = %state.run_id, steps = plan.len(), "Plan accepted");

        state.set_plan(plan);
        self.store.save(state).await?;
        Ok(())
    }

    /// Execute one step, consuming iterations for every attempt.
    ///
    /// Returns `Err` only for run-terminal conditions (ceiling,
    /// cancellation, abort policy); step-level failures come back as a
    /// failed [`StepResult`].
    async fn execute_step(
        &self,
        state: &mut AgentState,
        step: &PlanStep,
    ) -> WorkflowResult<StepResult> {
        if step.is_direct_response() {
            self.check_ceiling(state)?;
            let answer = tokio::select! {
                _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                answer = self.responder.respond(&state.task, &step.description) => answer,
            };
            return match answer {
                Ok(answer) => Ok(StepResult::success(step.index, json!({"response": answer}))),
                Err(err) => {
                    state.record_error(Some(step.index), err.to_string());
                    self.step_failure(step, err.to_string())
                }
            };
        }

        let mut attempt = 0;
        loop {
            self.check_ceiling(state)?;

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                outcome = self.attempt_step(step) => outcome,
            };

            match outcome {
                Ok((server_id, tool, payload)) => {
                    return Ok(StepResult::success(step.index, payload)
                        .with_route(server_id, tool));
                }
                Err(err) => {
                    warn!(
                        run_id = %state.run_id,
                        step = step.index,
                        attempt,
                        error = %err,
                        "Step attempt failed"
                    );
                    state.record_error(Some(step.index), err.to_string());

                    if err.is_retryable() && attempt < self.config.max_step_retries {
                        attempt += 1;
                        tokio::select! {
                            _ = self.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                            _ = tokio::time::sleep(self.config.retry_backoff) => {}
                        }
                        continue;
                    }
                    return self.step_failure(step, err.to_string());
                }
            }
        }
    }

    async fn attempt_step(
        &self,
        step: &PlanStep,
    ) -> Result<(String, String, Value), conductor_core::InvokeError> {
        let (server_id, tool) = self
            .router
            .select(&step.description, step.requested_tool(), None)?;
        let args = json!({
            "action": step.action,
            "description": step.description,
        });
        let payload = self.router.connections().invoke(&server_id, &tool, args).await?;
        Ok((server_id, tool, payload))
    }

    fn step_failure(&self, step: &PlanStep, reason: String) -> WorkflowResult<StepResult> {
        match self.config.failure_policy {
            FailurePolicy::Abort => Err(WorkflowError::StepAborted {
                step_index: step.index,
                reason,
            }),
            FailurePolicy::Continue => Ok(StepResult::failure(step.index, reason)),
        }
    }

    fn check_ceiling(&self, state: &mut AgentState) -> WorkflowResult<()> {
        if state.note_iteration() > self.config.max_iterations {
            warn!(run_id = %state.run_id, "Iteration ceiling breached");
            return Err(WorkflowError::IterationCeilingExceeded {
                ceiling: self.config.max_iterations,
            });
        }
        Ok(())
    }
}

/// Results of completed steps, as context for re-planning a resumed run.
fn planning_context(state: &AgentState) -> Value {
    json!({
        "completed_steps": state.current_step_index,
        "results": state.step_results,
    })
}

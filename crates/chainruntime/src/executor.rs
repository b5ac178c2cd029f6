use crate::pipeline::{Pipeline, PipelineStep};
use chaincore::{EventBus, ExecutionError, ExecutionEvent, ExecutionId, NodeContext, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::Instrument;

/// What to do when a node records `State::error` but returns normally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftFailurePolicy {
    /// Log it and keep going; the node's payload becomes the stage output.
    #[default]
    Continue,
    /// Stop the chain as if the node had signaled the error.
    Abort,
}

impl std::str::FromStr for SoftFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(SoftFailurePolicy::Continue),
            "abort" => Ok(SoftFailurePolicy::Abort),
            other => Err(format!("unknown soft failure policy: {}", other)),
        }
    }
}

/// Runs a pipeline's nodes one after another against a single state
pub struct PipelineExecutor {
    soft_failure: SoftFailurePolicy,
}

impl PipelineExecutor {
    pub fn new(soft_failure: SoftFailurePolicy) -> Self {
        Self { soft_failure }
    }

    /// Execute every step in order and return the final state.
    ///
    /// The first signaled error stops the run; later steps never execute and
    /// side effects of earlier steps are left in place.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        state: State,
        event_bus: &EventBus,
    ) -> Result<ExecutionResult, ExecutionError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            workflow_id: state.workflow_id().map(str::to_string),
            node_ids: pipeline.node_sequence().into_iter().map(String::from).collect(),
            timestamp: Utc::now(),
        });

        let span = tracing::info_span!(
            "pipeline",
            %execution_id,
            workflow_id = state.workflow_id().unwrap_or("-"),
            nodes = pipeline.len()
        );

        let result = self
            .run_steps(pipeline, state, event_bus, execution_id)
            .instrument(span)
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;

        event_bus.emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result.map(|final_state| ExecutionResult {
            execution_id,
            duration_ms,
            final_state,
        })
    }

    async fn run_steps(
        &self,
        pipeline: &Pipeline,
        mut state: State,
        event_bus: &EventBus,
        execution_id: ExecutionId,
    ) -> Result<State, ExecutionError> {
        tracing::info!("Starting pipeline: {:?}", pipeline.node_sequence());

        for step in pipeline.steps() {
            self.run_step(step, &mut state, event_bus, execution_id)
                .instrument(tracing::info_span!(
                    "node",
                    node_id = %step.node_id,
                    position = step.position
                ))
                .await?;
        }

        tracing::info!("Pipeline completed");
        Ok(state)
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        state: &mut State,
        event_bus: &EventBus,
        execution_id: ExecutionId,
    ) -> Result<(), ExecutionError> {
        let ctx = NodeContext::new(
            step.node_id.clone(),
            step.position,
            step.params.clone(),
            event_bus.create_emitter(execution_id, step.node_id.clone(), step.position),
        );

        event_bus.emit(ExecutionEvent::NodeStarted {
            execution_id,
            node_id: step.node_id.clone(),
            position: step.position,
            timestamp: Utc::now(),
        });

        let error_before = state.error.clone();
        let start = Instant::now();
        let outcome = step.node.execute(&ctx, state).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = outcome {
            tracing::error!("Node {} failed: {}", step.node_id, e);

            event_bus.emit(ExecutionEvent::NodeFailed {
                execution_id,
                node_id: step.node_id.clone(),
                position: step.position,
                error: e.to_string(),
                timestamp: Utc::now(),
            });

            return Err(ExecutionError::NodeFailed {
                node_id: step.node_id.clone(),
                position: step.position,
                source: e,
            });
        }

        // A fresh `error` with a normal return is a soft failure.
        if let Some(message) = state.error.as_ref().filter(|_| state.error != error_before) {
            match self.soft_failure {
                SoftFailurePolicy::Continue => {
                    tracing::warn!("Node {} reported an error: {}", step.node_id, message);
                    ctx.events.warn(format!("Continuing after error: {}", message));
                }
                SoftFailurePolicy::Abort => {
                    tracing::error!("Node {} reported an error, aborting: {}", step.node_id, message);

                    event_bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: step.node_id.clone(),
                        position: step.position,
                        error: message.clone(),
                        timestamp: Utc::now(),
                    });

                    return Err(ExecutionError::SoftFailure {
                        node_id: step.node_id.clone(),
                        position: step.position,
                        message: message.clone(),
                    });
                }
            }
        }

        tracing::info!("Node {} completed in {}ms", step.node_id, duration_ms);

        event_bus.emit(ExecutionEvent::NodeCompleted {
            execution_id,
            node_id: step.node_id.clone(),
            position: step.position,
            output: state.current_output.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(())
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(SoftFailurePolicy::default())
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub duration_ms: u64,
    pub final_state: State,
}

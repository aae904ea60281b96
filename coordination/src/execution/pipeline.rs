//! Sequential pipeline: each stage sees the previous stage's answer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExecutionEngine, ExecutionError, ExecutionResult, StrategyOutcome};
use crate::registry::AgentRequest;
use crate::state::types::{AgentId, AgentOutput, Task};

impl ExecutionEngine {
    /// Run `agents` in order. The first failing stage aborts the pipeline
    /// and no partial result is returned.
    pub(crate) async fn run_pipeline(
        &self,
        agents: &[AgentId],
        task: Arc<Task>,
        cancel: &CancellationToken,
    ) -> ExecutionResult<StrategyOutcome> {
        let mut previous: Option<AgentOutput> = None;

        for (stage, agent_id) in agents.iter().enumerate() {
            debug!(task_id = %task.id, stage, agent_id = %agent_id, "Pipeline stage starting");
            let request =
                AgentRequest::new(Arc::clone(&task), cancel.clone()).with_previous_result(previous.take());

            match self.dispatch(agent_id, request).await {
                Ok(output) => previous = Some(output),
                Err(ExecutionError::Cancelled) => return Err(ExecutionError::Cancelled),
                Err(e) => {
                    warn!(task_id = %task.id, stage, agent_id = %agent_id, "Pipeline aborted");
                    return Err(ExecutionError::PipelineStage {
                        stage,
                        agent_id: agent_id.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        previous
            .map(|output| StrategyOutcome::direct(output, agents.to_vec()))
            .ok_or(ExecutionError::EmptyAgentSet)
    }
}

//! Single-agent execution: one call, failure surfaced unmodified.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{ExecutionEngine, ExecutionResult, StrategyOutcome};
use crate::registry::AgentRequest;
use crate::state::types::{AgentId, Task};

impl ExecutionEngine {
    pub(crate) async fn run_single(
        &self,
        agent_id: &AgentId,
        task: Arc<Task>,
        cancel: &CancellationToken,
    ) -> ExecutionResult<StrategyOutcome> {
        let output = self
            .dispatch(agent_id, AgentRequest::new(task, cancel.clone()))
            .await?;
        Ok(StrategyOutcome::direct(output, vec![agent_id.clone()]))
    }
}

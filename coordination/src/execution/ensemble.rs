//! Concurrent ensemble: every agent answers, consensus reconciles.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ConsensusPlan, ExecutionEngine, ExecutionError, ExecutionResult, StrategyOutcome};
use crate::consensus::{AgentSignals, ConsensusAlgorithm, ConsensusOptions};
use crate::registry::AgentRequest;
use crate::router::TaskProfile;
use crate::state::types::{AgentId, AgentResponse, Task};

impl ExecutionEngine {
    /// Issue every call, wait for all of them, then reconcile.
    ///
    /// Individual failures become `Failure` responses; only a fully failed
    /// ensemble is an error.
    pub(crate) async fn run_ensemble(
        &self,
        agents: &[AgentId],
        task: Arc<Task>,
        profile: &TaskProfile,
        plan: &ConsensusPlan,
        cancel: &CancellationToken,
    ) -> ExecutionResult<StrategyOutcome> {
        info!(task_id = %task.id, agents = agents.len(), algorithm = %plan.algorithm, "Starting ensemble");

        let calls = agents.iter().map(|agent_id| {
            let request = AgentRequest::new(Arc::clone(&task), cancel.clone());
            async move { (agent_id, self.dispatch(agent_id, request).await) }
        });
        let settled = join_all(calls).await;

        let mut responses = Vec::with_capacity(settled.len());
        for (agent_id, result) in settled {
            match result {
                Ok(output) => responses.push(AgentResponse::success(agent_id.clone(), output)),
                Err(ExecutionError::Cancelled) => return Err(ExecutionError::Cancelled),
                Err(e) => responses.push(AgentResponse::failure(agent_id.clone(), e.to_string())),
            }
        }

        let successes = responses.iter().filter(|r| !r.is_failure()).count();
        debug!(task_id = %task.id, successes, failed = responses.len() - successes, "Ensemble settled");
        if successes == 0 {
            return Err(ExecutionError::ConsensusInsufficientData {
                attempted: responses.len(),
            });
        }

        let options = self.consensus_options(plan, agents, profile);
        let outcome = self.reconcile(&task.id, &responses, plan, &options)?;
        Ok(StrategyOutcome {
            output: outcome.consensus.clone(),
            agents_involved: agents.to_vec(),
            consensus: Some(outcome),
            quality_retry: None,
        })
    }

    /// Caller's options, with registry-derived signals filled in for
    /// `dynamic_weighting` where the caller gave none.
    pub(crate) fn consensus_options(
        &self,
        plan: &ConsensusPlan,
        agents: &[AgentId],
        profile: &TaskProfile,
    ) -> ConsensusOptions {
        let mut options = plan.options.clone();
        if plan.algorithm != ConsensusAlgorithm::DynamicWeighting {
            return options;
        }

        let now = Utc::now();
        for agent_id in agents {
            if options.dynamic.signals.contains_key(agent_id) {
                continue;
            }
            let Ok(snapshot) = self.registry.get(agent_id) else {
                continue;
            };

            let mut signals =
                AgentSignals::default().with_performance(snapshot.performance.success_rate);
            if let Some(last_active) = snapshot.last_active {
                signals = signals.with_recency(AgentSignals::recency_since(last_active, now));
            }
            if snapshot.profile.specializes_in(&profile.domain) {
                signals = signals.with_specialty_relevance(1.0);
            }
            options.dynamic.signals.insert(agent_id.clone(), signals);
        }
        options
    }
}

//! Quality gate for multi-agent strategies.
//!
//! ```text
//! score = 0.8
//!       − 0.5   if the answer carries an error flag
//!       − 0.1   per warning
//!       − 0.2   if completeness < 0.8
//! ```
//!
//! Below the threshold the best agent for the task's domain gets one more
//! try with the low-scoring answer attached. Whatever that retry returns is
//! used; a failed retry keeps the original answer.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ExecutionEngine, StrategyOutcome};
use crate::events::OrchestratorEvent;
use crate::registry::AgentRequest;
use crate::router::TaskProfile;
use crate::state::types::{AgentId, AgentOutput, Task};

const BASE_SCORE: f64 = 0.8;
const ERROR_PENALTY: f64 = 0.5;
const WARNING_PENALTY: f64 = 0.1;
const INCOMPLETE_PENALTY: f64 = 0.2;
const COMPLETENESS_FLOOR: f64 = 0.8;

/// Scores below this trigger a retry
pub const DEFAULT_GATE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub threshold: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_GATE_THRESHOLD,
        }
    }
}

impl QualityGate {
    pub fn score(&self, output: &AgentOutput) -> f64 {
        let mut score = BASE_SCORE;
        if output.has_error_flag() {
            score -= ERROR_PENALTY;
        }
        score -= WARNING_PENALTY * output.warnings.len() as f64;
        if output.completeness.is_some_and(|c| c < COMPLETENESS_FLOOR) {
            score -= INCOMPLETE_PENALTY;
        }
        score
    }

    pub fn passes(&self, output: &AgentOutput) -> bool {
        self.score(output) >= self.threshold
    }
}

/// Record of the single retry a low-scoring answer received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRetry {
    pub agent_id: AgentId,
    pub original_score: f64,
    /// Whether the retry's answer replaced the original
    pub substituted: bool,
}

impl ExecutionEngine {
    pub(crate) async fn apply_quality_gate(
        &self,
        task: Arc<Task>,
        profile: &TaskProfile,
        mut outcome: StrategyOutcome,
        cancel: &CancellationToken,
    ) -> StrategyOutcome {
        if self.gate.passes(&outcome.output) {
            return outcome;
        }
        let original_score = self.gate.score(&outcome.output);

        let Some(agent_id) = self.registry.best_for_domain(&profile.domain) else {
            warn!(task_id = %task.id, original_score, "Quality gate failed but no agent is available for a retry");
            return outcome;
        };
        info!(
            task_id = %task.id,
            agent_id = %agent_id,
            original_score,
            threshold = self.gate.threshold,
            "Quality gate failed, retrying once"
        );

        let request = AgentRequest::new(Arc::clone(&task), cancel.clone())
            .with_previous_result(Some(outcome.output.clone()));
        let substituted = match self.dispatch(&agent_id, request).await {
            Ok(output) => {
                outcome.output = output;
                if !outcome.agents_involved.contains(&agent_id) {
                    outcome.agents_involved.push(agent_id.clone());
                }
                true
            }
            Err(e) => {
                warn!(task_id = %task.id, agent_id = %agent_id, error = %e, "Quality retry failed, keeping original result");
                false
            }
        };

        self.event_bus.publish(OrchestratorEvent::QualityRetry {
            task_id: task.id.clone(),
            agent_id: agent_id.clone(),
            original_score,
            substituted,
            timestamp: Utc::now(),
        });
        outcome.quality_retry = Some(QualityRetry {
            agent_id,
            original_score,
            substituted,
        });
        outcome
    }
}

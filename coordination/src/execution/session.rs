//! Collaborative sessions: agents take turns over a shared context.
//!
//! ```text
//! context = { task, sessionId, participants }
//!   agent 1 ──▶ context["agent1_result"]
//!   agent 2 ──▶ context["agent2_result"]   (sees agent 1's entry)
//!   agent 3 ──▶ context["agent3_error"]    (failure recorded, session continues)
//! ```
//!
//! A session lives for one task and is dropped when the strategy returns.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConsensusPlan, ExecutionEngine, ExecutionError, ExecutionResult, StrategyOutcome};
use crate::registry::{AgentRequest, SharedContext};
use crate::router::TaskProfile;
use crate::state::types::{AgentId, AgentOutput, AgentResponse, SessionId, Task};

/// Ephemeral shared workspace for one collaborative run
#[derive(Debug, Clone)]
pub struct CollaborativeSession {
    id: SessionId,
    participants: Vec<AgentId>,
    context: SharedContext,
}

impl CollaborativeSession {
    pub fn new(task: &Task, participants: &[AgentId]) -> Self {
        let id = Uuid::new_v4().to_string();
        let mut context = SharedContext::new();
        context.insert(
            "task".to_string(),
            serde_json::to_value(task).unwrap_or_default(),
        );
        context.insert("sessionId".to_string(), Value::String(id.clone()));
        context.insert(
            "participants".to_string(),
            Value::from(participants.to_vec()),
        );

        Self {
            id,
            participants: participants.to_vec(),
            context,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[AgentId] {
        &self.participants
    }

    /// Context written so far
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn record_result(&mut self, agent_id: &str, output: &AgentOutput) {
        self.context.insert(
            format!("{agent_id}_result"),
            serde_json::to_value(output).unwrap_or_default(),
        );
    }

    pub fn record_error(&mut self, agent_id: &str, error: &str) {
        self.context
            .insert(format!("{agent_id}_error"), Value::String(error.to_string()));
    }
}

impl ExecutionEngine {
    /// Run participants one after another over a shared context.
    ///
    /// Two or more answers are reconciled by consensus; a single answer is
    /// used as is.
    pub(crate) async fn run_collaborative(
        &self,
        agents: &[AgentId],
        task: Arc<Task>,
        profile: &TaskProfile,
        plan: &ConsensusPlan,
        cancel: &CancellationToken,
    ) -> ExecutionResult<StrategyOutcome> {
        let mut session = CollaborativeSession::new(&task, agents);
        info!(task_id = %task.id, session_id = %session.id(), participants = session.participants().len(), "Collaborative session opened");

        let mut responses = Vec::with_capacity(agents.len());
        for agent_id in agents {
            let request = AgentRequest::new(Arc::clone(&task), cancel.clone())
                .with_shared_context(session.context().clone());

            match self.dispatch(agent_id, request).await {
                Ok(output) => {
                    session.record_result(agent_id, &output);
                    responses.push(AgentResponse::success(agent_id.clone(), output));
                }
                Err(ExecutionError::Cancelled) => return Err(ExecutionError::Cancelled),
                Err(e) => {
                    let message = e.to_string();
                    session.record_error(agent_id, &message);
                    responses.push(AgentResponse::failure(agent_id.clone(), message));
                }
            }
        }
        debug!(task_id = %task.id, session_id = %session.id(), "Collaborative session closed");

        let successes: Vec<&AgentOutput> = responses.iter().filter_map(|r| r.result()).collect();
        match successes.as_slice() {
            [] => Err(ExecutionError::ConsensusInsufficientData {
                attempted: responses.len(),
            }),
            [only] => Ok(StrategyOutcome::direct((*only).clone(), session.participants().to_vec())),
            _ => {
                let options = self.consensus_options(plan, agents, profile);
                let outcome = self.reconcile(&task.id, &responses, plan, &options)?;
                Ok(StrategyOutcome {
                    output: outcome.consensus.clone(),
                    agents_involved: session.participants().to_vec(),
                    consensus: Some(outcome),
                    quality_retry: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::execution::tests::{engine, Scripted};
    use crate::registry::Agent;
    use crate::router::TaskAnalyzer;

    /// Records the context keys it was shown
    struct Observer {
        answer: f64,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Agent for Observer {
        async fn execute(&self, request: AgentRequest) -> anyhow::Result<AgentOutput> {
            let context = request.shared_context.unwrap_or_default();
            let mut keys: Vec<String> = context.keys().cloned().collect();
            keys.sort();
            *self.seen.lock().unwrap() = keys;
            Ok(AgentOutput::numeric(self.answer).with_confidence(0.9))
        }
    }

    fn observer(answer: f64) -> Arc<Observer> {
        Arc::new(Observer {
            answer,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn profile() -> TaskProfile {
        TaskAnalyzer::new().analyze(&Task::new("x"))
    }

    #[test]
    fn test_session_seeds_context() {
        let task = Task::new("design it").with_id("t-1");
        let participants = vec!["a".to_string(), "b".to_string()];
        let session = CollaborativeSession::new(&task, &participants);

        let context = session.context();
        assert_eq!(context["sessionId"], Value::String(session.id().to_string()));
        assert_eq!(context["participants"], serde_json::json!(["a", "b"]));
        assert_eq!(context["task"]["id"], "t-1");
    }

    #[tokio::test]
    async fn test_participants_see_earlier_entries() {
        let first = observer(1.0);
        let second = observer(1.0);
        let engine = engine(
            vec![
                ("first", first.clone() as Arc<dyn Agent>),
                ("broken", Scripted::failing()),
                ("second", second.clone() as Arc<dyn Agent>),
            ],
            Duration::from_secs(5),
        );
        let agents: Vec<AgentId> = ["first", "broken", "second"].map(String::from).to_vec();

        let outcome = engine
            .run_collaborative(
                &agents,
                Task::new("x").shared(),
                &profile(),
                &ConsensusPlan::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            *first.seen.lock().unwrap(),
            vec!["participants", "sessionId", "task"]
        );
        assert_eq!(
            *second.seen.lock().unwrap(),
            vec![
                "broken_error",
                "first_result",
                "participants",
                "sessionId",
                "task"
            ]
        );
        let consensus = outcome.consensus.unwrap();
        assert_eq!(consensus.participants(), 2);
        assert_eq!(consensus.failed(), 1);
    }

    #[tokio::test]
    async fn test_single_survivor_is_used_directly() {
        let engine = engine(
            vec![
                ("ok", Scripted::ok(AgentOutput::text("only"))),
                ("bad", Scripted::failing()),
            ],
            Duration::from_secs(5),
        );
        let agents: Vec<AgentId> = ["ok", "bad"].map(String::from).to_vec();

        let outcome = engine
            .run_collaborative(
                &agents,
                Task::new("x").shared(),
                &profile(),
                &ConsensusPlan::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.output.output.as_deref(), Some("only"));
        assert!(outcome.consensus.is_none());
    }

    #[tokio::test]
    async fn test_all_failures_is_insufficient_data() {
        let engine = engine(vec![("bad", Scripted::failing())], Duration::from_secs(5));
        let err = engine
            .run_collaborative(
                &["bad".to_string()],
                Task::new("x").shared(),
                &profile(),
                &ConsensusPlan::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ConsensusInsufficientData { attempted: 1 }));
    }
}

//! Execution Engines: run a routed task against its agents
//!
//! # Strategies
//!
//! ```text
//! Strategy              | Dispatch                   | Failure semantics
//! ----------------------|----------------------------|-----------------------------------------
//! SingleAgent           | one call                   | error surfaced unmodified
//! Pipeline              | sequential, chained result | first failure aborts, names stage/agent
//! Ensemble              | concurrent, joined         | fails only when every agent fails
//! CollaborativeSession  | sequential, shared context | fails only when every agent fails
//! ```
//!
//! Every agent call goes through [`ExecutionEngine::dispatch`]: registry
//! lease (agent `busy`), a per-call timeout racing the agent, a cancellation
//! token handed to the agent, then counters and status updated from the
//! outcome. Ensemble and session results pass through the quality gate.

pub mod ensemble;
pub mod pipeline;
pub mod quality_gate;
pub mod session;
pub mod single;

pub use quality_gate::{QualityGate, QualityRetry, DEFAULT_GATE_THRESHOLD};
pub use session::CollaborativeSession;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::consensus::{
    ConsensusAlgorithm, ConsensusEngine, ConsensusError, ConsensusOptions, ConsensusOutcome,
};
use crate::events::{OrchestratorEvent, SharedEventBus};
use crate::registry::{AgentRequest, RegistryError, SharedAgentRegistry};
use crate::router::TaskProfile;
use crate::state::types::{AgentId, AgentOutput, AgentResponse, ExecutionStrategy, Task, TaskError};
use crate::telemetry;

/// Error type for execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Agent {agent_id} timed out after {timeout_ms}ms")]
    AgentTimeout { agent_id: AgentId, timeout_ms: u64 },

    #[error("Agent {agent_id} failed: {message}")]
    AgentFailed { agent_id: AgentId, message: String },

    #[error("Pipeline stage {stage} (agent {agent_id}) failed: {source}")]
    PipelineStage {
        stage: usize,
        agent_id: AgentId,
        #[source]
        source: Box<ExecutionError>,
    },

    #[error("Insufficient data for consensus: all {attempted} agents failed")]
    ConsensusInsufficientData { attempted: usize },

    #[error("Strategy has no agents")]
    EmptyAgentSet,

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl ExecutionError {
    /// Stable snake_case code carried in `TaskError::kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentNotFound(_) => "agent_not_found",
            Self::AgentTimeout { .. } => "agent_timeout",
            Self::AgentFailed { .. } => "agent_failed",
            Self::PipelineStage { .. } => "pipeline_stage",
            Self::ConsensusInsufficientData { .. } => "consensus_insufficient_data",
            Self::EmptyAgentSet => "empty_agent_set",
            Self::Cancelled => "cancelled",
            Self::Registry(_) => "registry",
            Self::Consensus(e) => e.kind(),
        }
    }

    pub fn to_task_error(&self) -> TaskError {
        TaskError {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<RegistryError> for ExecutionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AgentNotFound(id) => Self::AgentNotFound(id),
            other => Self::Registry(other),
        }
    }
}

/// Result type for execution
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Bound on each agent call
    pub agent_timeout: Duration,
    /// Quality gate after ensemble and session strategies
    pub quality_gate: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for ExecutionConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            agent_timeout: config.agent_timeout(),
            quality_gate: config.quality_gate,
        }
    }
}

/// Caller's consensus choice for multi-agent strategies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusPlan {
    pub algorithm: ConsensusAlgorithm,
    pub options: ConsensusOptions,
}

impl ConsensusPlan {
    pub fn new(algorithm: ConsensusAlgorithm) -> Self {
        Self {
            algorithm,
            options: ConsensusOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConsensusOptions) -> Self {
        self.options = options;
        self
    }
}

/// What a strategy produced
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub output: AgentOutput,
    /// Agents that were called, in dispatch order
    pub agents_involved: Vec<AgentId>,
    pub consensus: Option<ConsensusOutcome>,
    pub quality_retry: Option<QualityRetry>,
}

impl StrategyOutcome {
    pub(crate) fn direct(output: AgentOutput, agents_involved: Vec<AgentId>) -> Self {
        Self {
            output,
            agents_involved,
            consensus: None,
            quality_retry: None,
        }
    }
}

/// Runs strategies against the registry's agents
pub struct ExecutionEngine {
    registry: SharedAgentRegistry,
    event_bus: SharedEventBus,
    consensus: ConsensusEngine,
    gate: QualityGate,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(
        registry: SharedAgentRegistry,
        event_bus: SharedEventBus,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            event_bus,
            consensus: ConsensusEngine::new(),
            gate: QualityGate::default(),
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run a task with the routed strategy.
    ///
    /// Every agent the strategy names must be registered; a missing one fails
    /// the task before any agent is called.
    pub async fn execute(
        &self,
        strategy: &ExecutionStrategy,
        task: Arc<Task>,
        profile: &TaskProfile,
        plan: &ConsensusPlan,
        cancel: &CancellationToken,
    ) -> ExecutionResult<StrategyOutcome> {
        let agents = strategy.agents();
        if agents.is_empty() {
            return Err(ExecutionError::EmptyAgentSet);
        }
        self.registry.ensure_registered(&agents)?;

        let outcome = match strategy {
            ExecutionStrategy::SingleAgent { agent } => {
                self.run_single(agent, task.clone(), cancel).await?
            }
            ExecutionStrategy::Pipeline { agents } => {
                self.run_pipeline(agents, task.clone(), cancel).await?
            }
            ExecutionStrategy::Ensemble { agents } => {
                self.run_ensemble(agents, task.clone(), profile, plan, cancel)
                    .await?
            }
            ExecutionStrategy::CollaborativeSession { agents } => {
                self.run_collaborative(agents, task.clone(), profile, plan, cancel)
                    .await?
            }
        };

        if self.config.quality_gate && strategy.kind().is_quality_gated() {
            Ok(self.apply_quality_gate(task, profile, outcome, cancel).await)
        } else {
            Ok(outcome)
        }
    }

    /// The single path every agent call takes
    pub(crate) async fn dispatch(
        &self,
        agent_id: &str,
        request: AgentRequest,
    ) -> ExecutionResult<AgentOutput> {
        let task_id = request.task.id.clone();
        let lease = self.registry.lease(agent_id, &task_id).await?;
        let agent = lease.handle();

        let parent = request.cancel.clone();
        let call_token = parent.child_token();
        let request = AgentRequest {
            cancel: call_token.clone(),
            ..request
        };
        let timeout = self.config.agent_timeout;
        let span = telemetry::agent_span(&task_id, agent_id);
        let started = Instant::now();

        debug!(task_id = %task_id, agent_id, timeout_ms = timeout.as_millis() as u64, "Dispatching agent");

        let result = tokio::select! {
            biased;
            _ = parent.cancelled() => Err(ExecutionError::Cancelled),
            outcome = tokio::time::timeout(timeout, agent.execute(request).instrument(span)) => match outcome {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(ExecutionError::AgentFailed {
                    agent_id: agent_id.to_string(),
                    message: format!("{e:#}"),
                }),
                Err(_) => {
                    call_token.cancel();
                    Err(ExecutionError::AgentTimeout {
                        agent_id: agent_id.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => {
                debug!(task_id = %task_id, agent_id, elapsed_ms, "Agent succeeded");
                lease.settle_success(elapsed_ms);
            }
            Err(ExecutionError::Cancelled) => {
                debug!(task_id = %task_id, agent_id, "Agent call cancelled");
                drop(lease);
            }
            Err(e) => {
                warn!(task_id = %task_id, agent_id, elapsed_ms, error = %e, "Agent call failed");
                lease.settle_failure();
                self.event_bus.publish(OrchestratorEvent::AgentFailed {
                    task_id: task_id.clone(),
                    agent_id: agent_id.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        result
    }

    /// Reconcile several responses and announce the outcome
    pub(crate) fn reconcile(
        &self,
        task_id: &str,
        responses: &[AgentResponse],
        plan: &ConsensusPlan,
        options: &ConsensusOptions,
    ) -> ExecutionResult<ConsensusOutcome> {
        let outcome = self
            .consensus
            .build_with(responses, plan.algorithm, options)?;
        self.event_bus.publish(OrchestratorEvent::ConsensusReached {
            task_id: task_id.to_string(),
            algorithm: outcome.algorithm,
            confidence: outcome.confidence,
            participants: outcome.participants(),
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }
}

//! Core types shared by the router, execution engines, consensus engine and
//! learning loop.
//!
//! Agent answers are modelled as an explicit record with optional fields
//! rather than an untyped JSON blob, so consensus algorithms can match on
//! what is actually present.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusAlgorithm;

/// Unique identifier for submitted tasks
pub type TaskId = String;

/// Unique identifier for registered agents (registry key)
pub type AgentId = String;

/// Unique identifier for collaborative sessions
pub type SessionId = String;

/// Confidence assumed when an agent does not report one
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

fn default_task_type() -> String {
    "general".to_string()
}

/// A unit of work submitted for routing. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Free-form description of the work
    pub description: String,

    /// Requirements the answer must satisfy
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Constraints on how the work may be done
    #[serde(default)]
    pub constraints: Vec<String>,

    /// Tasks this one depends on
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Caller-supplied task type (e.g. "bugfix", "feature")
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: String,
}

impl Task {
    /// Create a new task with a generated id and the `general` type
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            requirements: Vec::new(),
            constraints: Vec::new(),
            dependencies: Vec::new(),
            task_type: default_task_type(),
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the task type
    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    /// Add requirements
    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements
            .extend(requirements.into_iter().map(Into::into));
        self
    }

    /// Add constraints
    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.extend(constraints.into_iter().map(Into::into));
        self
    }

    /// Add dependencies on other tasks
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Wrap in an `Arc` for sharing across concurrent agent calls
    pub fn shared(self) -> Arc<Task> {
        Arc::new(self)
    }
}

/// An agent's answer to a task.
///
/// Every field is optional; agents fill in whatever they can report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    /// Numeric answer, if the task has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    /// Textual answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Kind of result (e.g. "analysis", "patch")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,

    /// Self-reported confidence (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Self-reported completeness (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<f64>,

    /// Self-reported accuracy (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    /// Non-fatal warnings raised while producing the answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// In-band error flag reported by the agent itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque extra payload
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl AgentOutput {
    /// Create a numeric answer
    pub fn numeric(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Create a textual answer
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    /// Set confidence, clamped to 0.0-1.0
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Set the result type
    pub fn with_type(mut self, result_type: impl Into<String>) -> Self {
        self.result_type = Some(result_type.into());
        self
    }

    /// Set completeness, clamped to 0.0-1.0
    pub fn with_completeness(mut self, completeness: f64) -> Self {
        self.completeness = Some(completeness.clamp(0.0, 1.0));
        self
    }

    /// Set accuracy, clamped to 0.0-1.0
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy.clamp(0.0, 1.0));
        self
    }

    /// Append a warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Flag the answer as erroneous
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach an opaque payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Confidence, or [`DEFAULT_CONFIDENCE`] when not reported
    pub fn confidence_or_default(&self) -> f64 {
        self.confidence.unwrap_or(DEFAULT_CONFIDENCE)
    }

    /// Whether the agent flagged its own answer as erroneous
    pub fn has_error_flag(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of one agent's participation in a multi-agent strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    /// The agent answered
    Success(AgentOutput),
    /// The agent call failed (error, timeout)
    Failure(String),
}

/// One `(agentId, result | error)` entry fed to the consensus engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: AgentId,
    pub outcome: ResponseOutcome,
}

impl AgentResponse {
    /// A successful response
    pub fn success(agent_id: impl Into<AgentId>, output: AgentOutput) -> Self {
        Self {
            agent_id: agent_id.into(),
            outcome: ResponseOutcome::Success(output),
        }
    }

    /// A failed response
    pub fn failure(agent_id: impl Into<AgentId>, error: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            outcome: ResponseOutcome::Failure(error.into()),
        }
    }

    /// The answer, if the agent succeeded
    pub fn result(&self) -> Option<&AgentOutput> {
        match &self.outcome {
            ResponseOutcome::Success(output) => Some(output),
            ResponseOutcome::Failure(_) => None,
        }
    }

    /// Whether the agent call failed
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Failure(_))
    }
}

/// Discriminant of [`ExecutionStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    SingleAgent,
    Pipeline,
    Ensemble,
    CollaborativeSession,
}

impl StrategyKind {
    /// Whether results of this strategy pass through the quality gate
    pub fn is_quality_gated(&self) -> bool {
        matches!(self, Self::Ensemble | Self::CollaborativeSession)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleAgent => write!(f, "single_agent"),
            Self::Pipeline => write!(f, "pipeline"),
            Self::Ensemble => write!(f, "ensemble"),
            Self::CollaborativeSession => write!(f, "collaborative_session"),
        }
    }
}

/// Execution topology chosen once per task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One agent answers
    SingleAgent { agent: AgentId },
    /// Agents run in order, each seeing the previous result
    Pipeline { agents: Vec<AgentId> },
    /// Agents run concurrently, answers reconciled by consensus
    Ensemble { agents: Vec<AgentId> },
    /// Agents run in order over a shared session context
    CollaborativeSession { agents: Vec<AgentId> },
}

impl ExecutionStrategy {
    /// The strategy's discriminant
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::SingleAgent { .. } => StrategyKind::SingleAgent,
            Self::Pipeline { .. } => StrategyKind::Pipeline,
            Self::Ensemble { .. } => StrategyKind::Ensemble,
            Self::CollaborativeSession { .. } => StrategyKind::CollaborativeSession,
        }
    }

    /// Agents taking part, in dispatch order
    pub fn agents(&self) -> Vec<AgentId> {
        match self {
            Self::SingleAgent { agent } => vec![agent.clone()],
            Self::Pipeline { agents }
            | Self::Ensemble { agents }
            | Self::CollaborativeSession { agents } => agents.clone(),
        }
    }
}

/// Structured error carried by a failed [`TaskResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Stable snake_case error code (e.g. `agent_timeout`)
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// Compact record of the consensus step behind a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub algorithm: ConsensusAlgorithm,
    pub confidence: f64,
    pub participants: usize,
    pub failed: usize,
}

/// What `submit_task` resolves to. Carries either a result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AgentOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub strategy_used: StrategyKind,
    pub duration_ms: u64,
    pub agents_involved: Vec<AgentId>,
    /// Present when the result came out of the consensus engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSummary>,
    /// Whether the quality gate re-invoked an agent
    #[serde(default)]
    pub quality_retry: bool,
}

impl TaskResult {
    /// A successful result
    pub fn succeeded(
        task_id: impl Into<TaskId>,
        result: AgentOutput,
        strategy_used: StrategyKind,
        agents_involved: Vec<AgentId>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            result: Some(result),
            error: None,
            strategy_used,
            duration_ms,
            agents_involved,
            consensus: None,
            quality_retry: false,
        }
    }

    /// A failed result
    pub fn failed(
        task_id: impl Into<TaskId>,
        error: TaskError,
        strategy_used: StrategyKind,
        agents_involved: Vec<AgentId>,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            result: None,
            error: Some(error),
            strategy_used,
            duration_ms,
            agents_involved,
            consensus: None,
            quality_retry: false,
        }
    }

    /// Attach the consensus summary
    pub fn with_consensus(mut self, consensus: ConsensusSummary) -> Self {
        self.consensus = Some(consensus);
        self
    }

    /// Mark that the quality gate retried
    pub fn with_quality_retry(mut self, retried: bool) -> Self {
        self.quality_retry = retried;
        self
    }
}

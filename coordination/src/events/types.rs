//! Event types emitted by the orchestrator, engines and learning loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::ConsensusAlgorithm;
use crate::learning::Proposal;
use crate::state::types::{AgentId, StrategyKind, TaskId};

/// Every notification crossing component boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A task entered the orchestrator
    TaskSubmitted {
        task_id: TaskId,
        task_type: String,
        timestamp: DateTime<Utc>,
    },

    /// The router picked an execution strategy
    StrategySelected {
        task_id: TaskId,
        strategy: StrategyKind,
        agents: Vec<AgentId>,
        complexity: f64,
        domain: String,
        timestamp: DateTime<Utc>,
    },

    /// One agent call failed or timed out
    AgentFailed {
        task_id: TaskId,
        agent_id: AgentId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Several answers were reconciled
    ConsensusReached {
        task_id: TaskId,
        algorithm: ConsensusAlgorithm,
        confidence: f64,
        participants: usize,
        timestamp: DateTime<Utc>,
    },

    /// The quality gate re-invoked an agent
    QualityRetry {
        task_id: TaskId,
        agent_id: AgentId,
        original_score: f64,
        substituted: bool,
        timestamp: DateTime<Utc>,
    },

    /// The task produced a result
    TaskCompleted {
        task_id: TaskId,
        strategy: StrategyKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The task ended with a structured error
    TaskFailed {
        task_id: TaskId,
        error_kind: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The learning loop produced advisory proposals
    ProposalsIssued {
        proposals: Vec<Proposal>,
        window: usize,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TaskSubmitted { timestamp, .. }
            | Self::StrategySelected { timestamp, .. }
            | Self::AgentFailed { timestamp, .. }
            | Self::ConsensusReached { timestamp, .. }
            | Self::QualityRetry { timestamp, .. }
            | Self::TaskCompleted { timestamp, .. }
            | Self::TaskFailed { timestamp, .. }
            | Self::ProposalsIssued { timestamp, .. } => *timestamp,
        }
    }

    /// snake_case name matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::StrategySelected { .. } => "strategy_selected",
            Self::AgentFailed { .. } => "agent_failed",
            Self::ConsensusReached { .. } => "consensus_reached",
            Self::QualityRetry { .. } => "quality_retry",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::ProposalsIssued { .. } => "proposals_issued",
        }
    }

    /// Task the event belongs to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { task_id, .. }
            | Self::StrategySelected { task_id, .. }
            | Self::AgentFailed { task_id, .. }
            | Self::ConsensusReached { task_id, .. }
            | Self::QualityRetry { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
            Self::ProposalsIssued { .. } => None,
        }
    }
}

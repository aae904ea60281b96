//! Coordination Library
//!
//! Adaptive task routing and multi-agent consensus:
//! - Task analysis and complexity-driven strategy selection
//! - Single-agent, pipeline, ensemble and collaborative-session execution
//! - Pluggable consensus over several agents' answers
//! - A learning loop that records outcomes and proposes adjustments
//!
//! # Components
//!
//! ## Routing
//! - `TaskAnalyzer`: complexity, domain and capability profile of a task
//! - `AdaptiveRouter`: profile + per-domain `RoutingRules` → `ExecutionStrategy`
//!
//! ## Execution
//! - `ExecutionEngine`: one dispatch path (lease, timeout, cancellation) for every agent call
//! - Quality gate: one retry for low-scoring ensemble/session answers
//!
//! ## Consensus
//! - `majority_vote`, `weighted_average`, `confidence_based`, `expert_override`,
//!   `byzantine_fault_tolerant`, `dynamic_weighting`, `quality_threshold`
//!
//! ## Learning
//! - `LearningLoop`: bounded execution history, periodic advisory proposals
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::{AgentProfile, AgentRegistry, OrchestratorConfig, RoutingRules, Task, TaskOrchestrator};
//!
//! coordination::telemetry::init_tracing("coordination=info");
//!
//! let registry = AgentRegistry::new();
//! registry.register(AgentProfile::new("generalist").with_specialty("general"), agent)?;
//!
//! let orchestrator = TaskOrchestrator::new(
//!     registry.shared(),
//!     RoutingRules::load("routing.toml")?,
//!     OrchestratorConfig::from_env(),
//! )
//! .with_learning();
//!
//! let result = orchestrator.submit_task(Task::new("add rate limiting to the api")).await;
//! ```

pub mod config;
pub mod consensus;
pub mod events;
pub mod execution;
pub mod learning;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod state;
pub mod telemetry;

// Re-export configuration types
pub use config::{ConfigError, ConfigResult, CoordinationConfig, OrchestratorConfig};

// Re-export consensus types
pub use consensus::{
    AgentSignals, ConsensusAlgorithm, ConsensusEngine, ConsensusError, ConsensusOptions,
    ConsensusOutcome, ConsensusResult, QualityMetric,
};

// Re-export event types
pub use events::{EventBus, EventFilter, OrchestratorEvent, SharedEventBus};

// Re-export execution types
pub use execution::{
    ConsensusPlan, ExecutionConfig, ExecutionEngine, ExecutionError, ExecutionResult,
    StrategyOutcome,
};

// Re-export learning types
pub use learning::{
    AnalysisReport, ExecutionHistory, ExecutionRecord, LearningConfig, LearningLoop,
    LearningSnapshot, Proposal, ProposalKind,
};

// Re-export orchestrator types
pub use orchestrator::{ActiveExecution, SubmitOptions, TaskOrchestrator};

// Re-export registry types
pub use registry::{
    Agent, AgentProfile, AgentRegistry, AgentRequest, AgentStatus, RegistryError,
    RegistryResult, SharedAgentRegistry,
};

// Re-export router types
pub use router::{AdaptiveRouter, RoutingDecision, RoutingRule, RoutingRules, TaskAnalyzer, TaskProfile};

// Re-export domain types
pub use state::types::{
    AgentId, AgentOutput, AgentResponse, ExecutionStrategy, StrategyKind, Task, TaskError,
    TaskId, TaskResult,
};

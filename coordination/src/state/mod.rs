//! Shared domain types
//!
//! Everything the router, execution engines, consensus engine and learning
//! loop exchange lives here:
//!
//! - [`Task`]: the immutable unit of work a caller submits
//! - [`AgentOutput`]: an agent's answer, with explicit optional fields
//! - [`AgentResponse`]: `(agent, answer | error)` pairs fed to consensus
//! - [`ExecutionStrategy`]: the topology chosen for a task
//! - [`TaskResult`]: what `submit_task` always resolves to

pub mod types;

pub use types::{
    AgentId, AgentOutput, AgentResponse, ConsensusSummary, ExecutionStrategy, ResponseOutcome,
    SessionId, StrategyKind, Task, TaskError, TaskId, TaskResult, DEFAULT_CONFIDENCE,
};

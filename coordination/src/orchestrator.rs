//! Task Orchestrator: the public entry point
//!
//! # Flow
//!
//! ```text
//! submit_task(task)
//!   │  TaskSubmitted
//!   ▼
//! queue permit (max_concurrent_tasks)
//!   ▼
//! TaskAnalyzer::analyze ──▶ AdaptiveRouter::route ──▶ StrategySelected
//!   ▼
//! ExecutionEngine::execute (dispatch, consensus, quality gate)
//!   ▼
//! TaskResult ──▶ TaskCompleted | TaskFailed ──▶ learning loop
//! ```
//!
//! `submit_task` always resolves to a [`TaskResult`]; failures are carried
//! in its structured `error` rather than returned as `Err`.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = AgentRegistry::new().shared();
//! registry.register(AgentProfile::new("generalist"), Arc::new(MyAgent))?;
//!
//! let orchestrator = TaskOrchestrator::new(registry, RoutingRules::default(), OrchestratorConfig::from_env())
//!     .with_learning();
//! let result = orchestrator.submit_task(Task::new("summarize the incident")).await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

use crate::config::OrchestratorConfig;
use crate::consensus::{ConsensusAlgorithm, ConsensusOptions};
use crate::events::{EventBus, OrchestratorEvent, SharedEventBus};
use crate::execution::{
    ConsensusPlan, ExecutionConfig, ExecutionEngine, ExecutionError, ExecutionResult,
    StrategyOutcome,
};
use crate::learning::{ExecutionRecord, LearningConfig, LearningLoop};
use crate::registry::SharedAgentRegistry;
use crate::router::{AdaptiveRouter, RoutingRules, TaskAnalyzer, TaskProfile};
use crate::state::types::{
    AgentId, ExecutionStrategy, StrategyKind, Task, TaskId, TaskResult,
};
use crate::telemetry;

/// Per-submission overrides
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Consensus algorithm for ensembles and sessions
    pub algorithm: Option<ConsensusAlgorithm>,
    pub consensus: Option<ConsensusOptions>,
}

impl SubmitOptions {
    pub fn with_algorithm(mut self, algorithm: ConsensusAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_consensus(mut self, options: ConsensusOptions) -> Self {
        self.consensus = Some(options);
        self
    }
}

/// A task currently holding a queue permit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveExecution {
    pub task_id: TaskId,
    pub strategy: StrategyKind,
    pub agents: Vec<AgentId>,
    pub started_at: DateTime<Utc>,
}

/// Removes a task from the active map however its execution ends
struct ActiveGuard<'a> {
    active: &'a RwLock<HashMap<TaskId, ActiveExecution>>,
    task_id: TaskId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

pub struct TaskOrchestrator {
    registry: SharedAgentRegistry,
    rules: RoutingRules,
    config: OrchestratorConfig,
    analyzer: TaskAnalyzer,
    router: AdaptiveRouter,
    engine: ExecutionEngine,
    permits: Arc<Semaphore>,
    active: RwLock<HashMap<TaskId, ActiveExecution>>,
    event_bus: SharedEventBus,
    learning: Option<LearningLoop>,
    shutdown: CancellationToken,
}

impl TaskOrchestrator {
    /// Build an orchestrator over an already-populated registry.
    ///
    /// A `max_concurrent_tasks` of zero is treated as one.
    pub fn new(
        registry: SharedAgentRegistry,
        rules: RoutingRules,
        config: OrchestratorConfig,
    ) -> Self {
        let event_bus = EventBus::new().shared();
        let engine = ExecutionEngine::new(
            Arc::clone(&registry),
            Arc::clone(&event_bus),
            ExecutionConfig::from(&config),
        );

        info!(
            agents = registry.len(),
            domains = rules.domains.len(),
            max_concurrent_tasks = config.max_concurrent_tasks,
            agent_timeout_ms = config.agent_timeout_ms,
            "Task orchestrator ready"
        );

        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            registry,
            rules,
            analyzer: TaskAnalyzer::new(),
            router: AdaptiveRouter::new(),
            engine,
            active: RwLock::new(HashMap::new()),
            event_bus,
            learning: None,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Start the learning loop. Must be called inside a Tokio runtime.
    pub fn with_learning(mut self) -> Self {
        let learning = LearningLoop::spawn(
            LearningConfig::from(&self.config),
            Arc::clone(&self.event_bus),
        );
        self.learning = Some(learning);
        self
    }

    pub fn event_bus(&self) -> SharedEventBus {
        Arc::clone(&self.event_bus)
    }

    pub fn registry(&self) -> &SharedAgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn learning(&self) -> Option<&LearningLoop> {
        self.learning.as_ref()
    }

    /// Tasks holding a permit right now
    pub fn active_tasks(&self) -> Vec<ActiveExecution> {
        let mut active: Vec<ActiveExecution> = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Route and execute a task with the configured defaults
    pub async fn submit_task(&self, task: Task) -> TaskResult {
        self.submit_task_with(task, SubmitOptions::default()).await
    }

    pub async fn submit_task_with(&self, task: Task, options: SubmitOptions) -> TaskResult {
        let task = task.shared();
        let span = telemetry::task_span(&task.id, &task.task_type);
        self.run(task, options, span.clone()).instrument(span).await
    }

    /// Stop the learning loop and cancel in-flight agent calls
    pub async fn shutdown(&self) {
        info!(active = self.active_tasks().len(), "Shutting down task orchestrator");
        self.shutdown.cancel();
        if let Some(learning) = &self.learning {
            learning.shutdown().await;
        }
    }

    async fn run(&self, task: Arc<Task>, options: SubmitOptions, span: tracing::Span) -> TaskResult {
        let started = Instant::now();
        self.event_bus.publish(OrchestratorEvent::TaskSubmitted {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            timestamp: Utc::now(),
        });

        let profile = self.analyzer.analyze(&task);
        let decision = self.router.route(&profile, &self.rules);
        let strategy = decision.strategy;
        let kind = strategy.kind();

        let Some(_permit) = self.acquire_permit().await else {
            return self.finish(&task, &profile, &strategy, Err(ExecutionError::Cancelled), started);
        };

        telemetry::record_strategy(&span, &kind.to_string());
        self.event_bus.publish(OrchestratorEvent::StrategySelected {
            task_id: task.id.clone(),
            strategy: kind,
            agents: strategy.agents(),
            complexity: profile.complexity,
            domain: profile.domain.clone(),
            timestamp: Utc::now(),
        });

        let _active = self.track(&task.id, kind, strategy.agents());
        let plan = ConsensusPlan {
            algorithm: options.algorithm.unwrap_or(self.config.default_algorithm),
            options: options.consensus.unwrap_or_default(),
        };
        let cancel = self.shutdown.child_token();

        let outcome = self
            .engine
            .execute(&strategy, Arc::clone(&task), &profile, &plan, &cancel)
            .await;
        self.finish(&task, &profile, &strategy, outcome, started)
    }

    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    fn track(&self, task_id: &str, strategy: StrategyKind, agents: Vec<AgentId>) -> ActiveGuard<'_> {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                task_id.to_string(),
                ActiveExecution {
                    task_id: task_id.to_string(),
                    strategy,
                    agents,
                    started_at: Utc::now(),
                },
            );
        ActiveGuard {
            active: &self.active,
            task_id: task_id.to_string(),
        }
    }

    fn finish(
        &self,
        task: &Task,
        profile: &TaskProfile,
        strategy: &ExecutionStrategy,
        outcome: ExecutionResult<StrategyOutcome>,
        started: Instant,
    ) -> TaskResult {
        let kind = strategy.kind();
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(outcome) => {
                let mut result = TaskResult::succeeded(
                    task.id.clone(),
                    outcome.output,
                    kind,
                    outcome.agents_involved,
                    duration_ms,
                )
                .with_quality_retry(outcome.quality_retry.is_some());
                if let Some(consensus) = &outcome.consensus {
                    result = result.with_consensus(consensus.summary());
                }

                info!(task_id = %task.id, strategy = %kind, duration_ms, "Task completed");
                self.event_bus.publish(OrchestratorEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    strategy: kind,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                result
            }
            Err(e) => {
                error!(task_id = %task.id, strategy = %kind, error_kind = e.kind(), "Task failed: {}", e);
                let task_error = e.to_task_error();
                self.event_bus.publish(OrchestratorEvent::TaskFailed {
                    task_id: task.id.clone(),
                    error_kind: task_error.kind.clone(),
                    error: task_error.message.clone(),
                    timestamp: Utc::now(),
                });
                TaskResult::failed(task.id.clone(), task_error, kind, strategy.agents(), duration_ms)
            }
        };

        if let Some(learning) = &self.learning {
            learning.record(ExecutionRecord::from_result(task, profile, &result));
        }
        result
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
